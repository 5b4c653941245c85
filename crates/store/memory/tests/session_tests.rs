use std::sync::Arc;

use auditable_core::{AUDITABLE, AnyEntity, AuditFields, Auditable, Entity};
use auditable_store::{EntityState, ModelBuilder, QueryFilter, Session, Storage, StoreError};
use auditable_store_memory::MemoryStorage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Widget {
    id: i64,
    name: String,
    #[serde(flatten)]
    audit: AuditFields,
}

impl Widget {
    fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            audit: AuditFields::default(),
        }
    }
}

impl Auditable for Widget {
    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}

impl Entity for Widget {
    const ENTITY_TYPE: &'static str = "widgets";
    const CAPABILITIES: &'static [&'static str] = &[AUDITABLE];

    fn id(&self) -> i64 {
        self.id
    }

    fn as_auditable(&self) -> Option<&dyn Auditable> {
        Some(self)
    }

    fn as_auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
        Some(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Gadget {
    id: i64,
    label: String,
}

impl Entity for Gadget {
    const ENTITY_TYPE: &'static str = "gadgets";

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Unregistered {
    id: i64,
}

impl Entity for Unregistered {
    const ENTITY_TYPE: &'static str = "unregistered";

    fn id(&self) -> i64 {
        self.id
    }
}

fn hide_deleted() -> QueryFilter {
    Arc::new(|entity: &dyn AnyEntity| entity.auditable().is_none_or(|a| !a.is_deleted()))
}

fn session() -> (Arc<MemoryStorage>, Session) {
    let mut builder = ModelBuilder::new();
    builder.entity::<Widget>().entity::<Gadget>();
    builder.has_query_filter("widgets", hide_deleted()).unwrap();
    let model = Arc::new(builder.build().unwrap());
    let storage = Arc::new(MemoryStorage::new());
    let session = Session::new(Arc::clone(&storage) as Arc<dyn Storage>, model);
    (storage, session)
}

#[tokio::test]
async fn new_entities_are_inserted_on_flush() {
    let (storage, mut session) = session();
    let entry = session.track_as_new(Widget::new(1, "bolt")).unwrap();
    assert_eq!(entry.state(), EntityState::New);
    assert_eq!(storage.row_count("widgets"), 0);

    let affected = session.save_changes().await.unwrap();
    assert_eq!(affected, 1);
    assert_eq!(storage.row_count("widgets"), 1);
    assert_eq!(session.state_of::<Widget>(1), EntityState::Persisted);
}

#[tokio::test]
async fn unknown_entity_type_is_rejected() {
    let (_storage, mut session) = session();
    let err = session.track_as_new(Unregistered { id: 1 }).unwrap_err();
    assert!(matches!(err, StoreError::UnknownEntityType(name) if name == "unregistered"));
}

#[tokio::test]
async fn untracked_entity_is_transient() {
    let (_storage, mut session) = session();
    assert_eq!(session.state_of::<Widget>(42), EntityState::Transient);
    let entry = session.entry(Widget::new(42, "nut")).unwrap();
    assert_eq!(entry.state(), EntityState::Transient);
    assert_eq!(session.tracked_count(), 0);
}

#[tokio::test]
async fn dirty_columns_are_the_only_ones_written() {
    let (storage, mut session) = session();
    session.track_as_new(Widget::new(1, "bolt")).unwrap();
    session.save_changes().await.unwrap();

    let mut edited = Widget::new(1, "renamed but not marked");
    edited.audit.is_modified = Some(true);
    let mut entry = session.track_as_existing(edited).unwrap();
    assert_eq!(entry.state(), EntityState::Persisted);
    assert!(!entry.is_dirty());
    entry.mark_field_dirty("is_modified");
    assert!(entry.dirty_fields().contains("is_modified"));
    assert!(!entry.dirty_fields().contains("name"));

    session.save_changes().await.unwrap();
    let row = storage.get("widgets", 1).await.unwrap().unwrap();
    assert_eq!(row["name"], "bolt");
    assert_eq!(row["is_modified"], true);
}

#[tokio::test]
async fn generic_update_writes_the_whole_row() {
    let (storage, mut session) = session();
    session.track_as_new(Widget::new(1, "bolt")).unwrap();
    session.save_changes().await.unwrap();

    let entry = session.update(Widget::new(1, "washer")).unwrap();
    assert!(entry.is_dirty());
    session.save_changes().await.unwrap();

    let row = storage.get("widgets", 1).await.unwrap().unwrap();
    assert_eq!(row["name"], "washer");
}

#[tokio::test]
async fn update_many_marks_every_element() {
    let (storage, mut session) = session();
    session.track_as_new(Gadget { id: 1, label: "a".into() }).unwrap();
    session.track_as_new(Gadget { id: 2, label: "b".into() }).unwrap();
    session.save_changes().await.unwrap();

    session
        .update_many(vec![
            Gadget { id: 1, label: "a2".into() },
            Gadget { id: 2, label: "b2".into() },
        ])
        .unwrap();
    assert_eq!(session.save_changes().await.unwrap(), 2);

    let labels: Vec<_> = storage
        .scan("gadgets")
        .await
        .unwrap()
        .into_iter()
        .map(|row| row["label"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(labels, vec!["a2", "b2"]);
}

#[tokio::test]
async fn removing_a_new_entity_detaches_it() {
    let (storage, mut session) = session();
    session.track_as_new(Gadget { id: 1, label: "temp".into() }).unwrap();
    let entry = session.remove(Gadget { id: 1, label: "temp".into() }).unwrap();
    assert_eq!(entry.state(), EntityState::Detached);

    assert_eq!(session.save_changes().await.unwrap(), 0);
    assert_eq!(storage.row_count("gadgets"), 0);
    assert_eq!(session.state_of::<Gadget>(1), EntityState::Transient);
}

#[tokio::test]
async fn hard_remove_deletes_the_row() {
    let (storage, mut session) = session();
    session.track_as_new(Gadget { id: 1, label: "gone".into() }).unwrap();
    session.save_changes().await.unwrap();

    let entry = session.remove(Gadget { id: 1, label: "gone".into() }).unwrap();
    assert_eq!(entry.state(), EntityState::PendingDelete);
    assert_eq!(session.save_changes().await.unwrap(), 1);
    assert_eq!(storage.row_count("gadgets"), 0);
    assert_eq!(session.tracked_count(), 0);
}

#[tokio::test]
async fn remove_many_marks_every_element() {
    let (storage, mut session) = session();
    let gadgets: Vec<_> = (1..=3)
        .map(|id| Gadget { id, label: format!("g{id}") })
        .collect();
    for gadget in gadgets.clone() {
        session.track_as_new(gadget).unwrap();
    }
    session.save_changes().await.unwrap();

    session.remove_many(gadgets).unwrap();
    assert_eq!(session.save_changes().await.unwrap(), 3);
    assert_eq!(storage.row_count("gadgets"), 0);
}

#[tokio::test]
async fn writing_a_missing_row_is_a_concurrency_error() {
    let (_storage, mut session) = session();
    session.update(Gadget { id: 9, label: "ghost".into() }).unwrap();
    let err = session.save_changes().await.unwrap_err();
    assert!(matches!(err, StoreError::Concurrency { id: 9, .. }));
}

#[tokio::test]
async fn default_reads_apply_the_query_filter() {
    let (_storage, mut session) = session();
    let mut hidden = Widget::new(1, "hidden");
    hidden.audit.is_deleted = Some(true);
    let mut explicit_live = Widget::new(2, "live");
    explicit_live.audit.is_deleted = Some(false);
    let unset = Widget::new(3, "unset");

    for widget in [hidden, explicit_live, unset] {
        session.track_as_new(widget).unwrap();
    }
    session.save_changes().await.unwrap();

    let visible: Vec<_> = session
        .query::<Widget>()
        .to_list()
        .await
        .unwrap()
        .into_iter()
        .map(|w| w.id)
        .collect();
    assert_eq!(visible, vec![2, 3]);

    let all = session
        .query::<Widget>()
        .ignore_query_filters()
        .count()
        .await
        .unwrap();
    assert_eq!(all, 3);

    let named = session
        .query::<Widget>()
        .filter(|w| w.name == "unset")
        .first()
        .await
        .unwrap();
    assert_eq!(named.map(|w| w.id), Some(3));
}

#[tokio::test]
async fn find_prefers_tracked_instance_then_filtered_storage() {
    let (_storage, mut session) = session();
    let mut deleted = Widget::new(1, "deleted");
    deleted.audit.is_deleted = Some(true);
    session.track_as_new(deleted).unwrap();
    session.save_changes().await.unwrap();

    // Still tracked, so the session hands back its own instance.
    assert!(session.find::<Widget>(1).await.unwrap().is_some());

    session.clear();
    assert!(session.find::<Widget>(1).await.unwrap().is_none());
    assert!(session.find::<Widget>(2).await.unwrap().is_none());
}

#[tokio::test]
async fn has_changes_reflects_pending_writes() {
    let (_storage, mut session) = session();
    assert!(!session.has_changes().unwrap());
    session.track_as_new(Gadget { id: 1, label: "x".into() }).unwrap();
    assert!(session.has_changes().unwrap());
    session.save_changes().await.unwrap();
    assert!(!session.has_changes().unwrap());
}

#[tokio::test]
async fn whole_row_write_can_leave_columns_alone() {
    let (storage, mut session) = session();
    let mut original = Widget::new(1, "bolt");
    original.audit.created_by_id = Some("alice".into());
    session.track_as_new(original).unwrap();
    session.save_changes().await.unwrap();

    let mut entry = session.update(Widget::new(1, "renamed")).unwrap();
    entry.mark_all_dirty_except(["created_by_id"]);
    assert!(entry.dirty_fields().contains("name"));
    assert!(!entry.dirty_fields().contains("created_by_id"));
    session.save_changes().await.unwrap();

    let row = storage.get("widgets", 1).await.unwrap().unwrap();
    assert_eq!(row["name"], "renamed");
    assert_eq!(row["created_by_id"], "alice");
}

#[tokio::test]
async fn excluding_columns_does_not_touch_an_insert() {
    let (storage, mut session) = session();
    let mut widget = Widget::new(1, "bolt");
    widget.audit.created_by_id = Some("alice".into());
    let mut entry = session.track_as_new(widget).unwrap();
    entry.mark_all_dirty_except(["created_by_id"]);
    assert_eq!(entry.state(), EntityState::New);
    session.save_changes().await.unwrap();

    let row = storage.get("widgets", 1).await.unwrap().unwrap();
    assert_eq!(row["created_by_id"], "alice");
}
