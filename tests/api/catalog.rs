use claims::{assert_err, assert_ok};
use knowledge_service::repositories::record_repository::RecordRepositoryError;
use serde_json::json;

use crate::helpers::{spawn_app, user_ctx};

#[tokio::test]
async fn a_contact_submission_embeds_its_message() {
    let app = spawn_app();
    let ctx = user_ctx(1);

    let payload = serde_json::from_value(json!({
        "name": "Ada",
        "email": "ada@example.com",
        "message": "I would like to collaborate on a crate",
    }))
    .unwrap();

    let id = assert_ok!(app.contacts.add(payload, &ctx).await);

    let vector = app.index.stored_vector("contact", &id).unwrap();
    assert!(!vector.is_empty());

    let record = assert_ok!(app.contacts.get_by_id(&id).await);
    assert_eq!(
        record.payload.message.as_deref(),
        Some("I would like to collaborate on a crate")
    );
    assert_eq!(
        record.payload.extra.get("name").and_then(|v| v.as_str()),
        Some("Ada")
    );
}

#[tokio::test]
async fn a_contact_without_a_message_is_rejected() {
    let app = spawn_app();

    let payload = serde_json::from_value(json!({
        "name": "Ada",
        "email": "ada@example.com",
    }))
    .unwrap();

    let result = app.contacts.add(payload, &user_ctx(1)).await;

    assert_err!(&result);
    assert!(matches!(result, Err(RecordRepositoryError::Validation(_))));
}

#[tokio::test]
async fn a_skill_set_is_embedded_from_its_composite_text() {
    let app = spawn_app();
    let ctx = user_ctx(1);

    let payload = serde_json::from_value(json!({
        "title": "Backend",
        "skills": [{"name": "Rust"}, {"name": "Qdrant"}],
    }))
    .unwrap();

    let id = assert_ok!(app.skills.add(payload, &ctx).await);
    let vector = app.index.stored_vector("skills", &id).unwrap();
    assert!(!vector.is_empty());
}

#[tokio::test]
async fn changing_the_skill_list_recomputes_the_embedding() {
    let app = spawn_app();
    let ctx = user_ctx(1);

    let id = assert_ok!(
        app.skills
            .add(
                serde_json::from_value(json!({
                    "title": "Backend",
                    "skills": [{"name": "Rust"}],
                }))
                .unwrap(),
                &ctx,
            )
            .await
    );
    let vector_before = app.index.stored_vector("skills", &id).unwrap();

    assert_ok!(
        app.skills
            .update(
                &id,
                serde_json::from_value(json!({
                    "skills": [{"name": "Rust"}, {"name": "Tokio"}],
                }))
                .unwrap(),
                &ctx,
            )
            .await
    );

    let vector_after = app.index.stored_vector("skills", &id).unwrap();
    assert_ne!(vector_before, vector_after);
}

#[tokio::test]
async fn a_skill_set_without_named_skills_is_rejected() {
    let app = spawn_app();

    let payload = serde_json::from_value(json!({
        "title": "Backend",
        "skills": [],
    }))
    .unwrap();

    let result = app.skills.add(payload, &user_ctx(1)).await;

    assert!(matches!(result, Err(RecordRepositoryError::Validation(_))));
}
