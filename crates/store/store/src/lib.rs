pub mod error;
pub mod model;
pub mod query;
pub mod session;
pub mod state;
pub mod storage;
pub mod testing;

pub use error::StoreError;
pub use model::{EntityType, Model, ModelBuilder, QueryFilter};
pub use query::Query;
pub use session::{DirtyFields, EntityEntry, Session};
pub use state::EntityState;
pub use storage::{Row, Storage};
