use std::time::Duration;

use claims::{assert_ok, assert_err};
use knowledge_service::domain::services::rag::RagError;
use tokio::time::sleep;

use crate::helpers::{content_payload, spawn_app, user_ctx};

#[tokio::test]
async fn an_answer_cites_the_records_it_retrieved() {
    let app = spawn_app();
    let ctx = user_ctx(1);

    let id = assert_ok!(
        app.knowledge
            .add(content_payload("train for the marathon on sundays"), &ctx)
            .await
    );

    let answer = assert_ok!(app.rag.answer("when do I train?").await);

    assert_eq!(answer.text, "stub answer");
    assert!(!answer.context_used.is_empty());
    assert_eq!(answer.context_used[0].id, id.normalize());
    assert!(answer.context_used[0].relevance > 0.0);
    assert!(answer.context_used[0]
        .preview
        .contains("train for the marathon"));

    let prompt = app.generator.last_prompt().unwrap();
    assert!(prompt.contains("User Question: when do I train?"));
    assert!(prompt.contains("train for the marathon on sundays"));
    assert!(prompt.contains("Relevance:"));
}

#[tokio::test]
async fn an_empty_collection_falls_back_to_a_general_answer() {
    let app = spawn_app();

    let answer = assert_ok!(app.rag.answer("what's the weather?").await);

    assert!(answer.context_used.is_empty());
    let prompt = app.generator.last_prompt().unwrap();
    assert!(prompt.contains("No relevant context found in personal data"));
}

#[tokio::test]
async fn a_blank_query_is_rejected() {
    let app = spawn_app();

    let result = app.rag.answer("  \n ").await;

    assert_err!(&result);
    assert!(matches!(result, Err(RagError::Validation(_))));
}

#[tokio::test]
async fn every_answered_query_lands_in_the_audit_log() {
    let app = spawn_app();

    assert_ok!(app.rag.answer("what is on my list?").await);

    // The log write happens off the answer's critical path
    let mut logged = vec![];
    for _ in 0..100 {
        logged = assert_ok!(app.query_log.list().await);
        if !logged.is_empty() {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].query, "what is on my list?");
    assert!(logged[0].timestamp.is_some());

    assert_ok!(app.query_log.delete(&logged[0].id).await);
    let after = assert_ok!(app.query_log.list().await);
    assert!(after.is_empty());
}
