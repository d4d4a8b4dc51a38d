use std::cell::RefCell;
use std::rc::Rc;

use elif_memory_orm::{
    Attrs, CounterIdentityManager, IdentityManager, IdentityManagerFactory, ModelDefinition, ModelError, ModelResult,
    RecordId, Schema, SharedIdentityManager, UuidIdentityManager,
};
use serde_json::json;

/// Derives ids from the `slug` attribute
#[derive(Debug, Default)]
struct SlugIdentityManager {
    ids: Vec<RecordId>,
}

impl IdentityManager for SlugIdentityManager {
    fn fetch(&mut self, attrs: &Attrs) -> ModelResult<RecordId> {
        let slug = attrs
            .get("slug")
            .and_then(|s| s.as_str())
            .ok_or_else(|| ModelError::Configuration("slug is required".to_string()))?;
        let id = RecordId::new(slug);
        self.set(&id)?;
        Ok(id)
    }

    fn set(&mut self, id: &RecordId) -> ModelResult<()> {
        if self.ids.contains(id) {
            return Err(ModelError::DuplicateId {
                collection: String::new(),
                id: id.to_string(),
            });
        }
        self.ids.push(id.clone());
        Ok(())
    }

    fn reset(&mut self) {
        self.ids.clear();
    }
}

#[test]
fn test_per_model_identity_manager() {
    let slugs: SharedIdentityManager = Rc::new(RefCell::new(SlugIdentityManager::default()));
    let schema = Schema::builder()
        .model("page", ModelDefinition::new())
        .model("note", ModelDefinition::new())
        .identity_manager("page", slugs)
        .build()
        .unwrap();

    let page = schema.create("page", json!({ "slug": "about" })).unwrap();
    assert_eq!(page.id(), Some(RecordId::new("about")));
    assert_eq!(schema.create("note", ()).unwrap().id(), Some(RecordId::from(1)));

    let err = schema.create("page", json!({ "slug": "about" })).unwrap_err();
    assert_eq!(
        err,
        ModelError::DuplicateId {
            collection: "pages".to_string(),
            id: "about".to_string()
        }
    );
    assert!(matches!(schema.create("page", ()), Err(ModelError::Configuration(_))));
}

#[test]
fn test_application_identity_manager() {
    let factory: IdentityManagerFactory = Rc::new(|| Rc::new(RefCell::new(UuidIdentityManager::new())) as SharedIdentityManager);
    let schema = Schema::builder()
        .model("post", ModelDefinition::new().has_many("tags"))
        .model("tag", ModelDefinition::new().has_many("posts"))
        .application_identity_manager(factory)
        .build()
        .unwrap();

    let post = schema.create("post", ()).unwrap();
    let tag = post.create_related("tags", ()).unwrap();
    let id = post.id().unwrap();

    assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
    assert_eq!(tag.foreign_key("posts").unwrap(), json!([id.as_str()]));
    assert_eq!(schema.find("post", &id).unwrap(), Some(post));
}

#[test]
fn test_explicit_ids_advance_the_counter() {
    let schema = Schema::new(vec![("post", ModelDefinition::new())]).unwrap();
    schema.create("post", json!({ "id": 10 })).unwrap();
    assert_eq!(schema.create("post", ()).unwrap().id(), Some(RecordId::from(11)));

    let err = schema.create("post", json!({ "id": "10" })).unwrap_err();
    assert!(matches!(err, ModelError::DuplicateId { .. }));
}

#[test]
fn test_empty_data_resets_ids() {
    let manager = CounterIdentityManager::shared();
    let schema = Schema::builder()
        .model("post", ModelDefinition::new())
        .identity_manager("post", manager)
        .build()
        .unwrap();

    schema.create("post", ()).unwrap();
    schema.create("post", ()).unwrap();
    schema.empty_data();
    assert!(schema.dump()["posts"].is_empty());
    assert_eq!(schema.create("post", ()).unwrap().id(), Some(RecordId::from(1)));
}
