use claims::{assert_none, assert_ok, assert_some};
use fake::faker::internet::en::{Password, SafeEmail};
use fake::Fake;
use knowledge_service::domain::entities::record::Role;
use knowledge_service::repositories::user_repository::{UserPatch, UserRepositoryError};
use secrecy::Secret;

use crate::helpers::spawn_app;

#[tokio::test]
async fn a_created_user_is_found_by_email_and_api_key() {
    let app = spawn_app();
    let email: String = SafeEmail().fake();
    let password: String = Password(8..24).fake();

    let created = assert_ok!(
        app.users
            .create(&email, Secret::new(password.clone()), None, Role::User)
            .await
    );

    let by_email = assert_some!(assert_ok!(app.users.find_by_email(&email).await));
    assert_eq!(by_email.id, created.id);
    assert_ok!(by_email.password_hash.verify(Secret::new(password)));

    let by_key = assert_some!(assert_ok!(app.users.find_by_api_key(&created.api_key).await));
    assert_eq!(by_key.id, created.id);
}

#[tokio::test]
async fn an_unknown_email_finds_nobody() {
    let app = spawn_app();

    let found = assert_ok!(app.users.find_by_email("nobody@example.com").await);

    assert_none!(found);
}

#[tokio::test]
async fn updating_the_password_rehashes_it() {
    let app = spawn_app();
    let email: String = SafeEmail().fake();
    let old_password: String = Password(8..24).fake();
    let new_password: String = Password(8..24).fake();

    let created = assert_ok!(
        app.users
            .create(&email, Secret::new(old_password.clone()), None, Role::User)
            .await
    );

    assert_ok!(
        app.users
            .update(
                created.id,
                UserPatch {
                    password: Some(Secret::new(new_password.clone())),
                    full_name: Some("Ada Lovelace".into()),
                    ..Default::default()
                },
            )
            .await
    );

    let updated = assert_ok!(app.users.get_by_id(created.id).await);
    assert_ok!(updated.password_hash.verify(Secret::new(new_password)));
    assert!(updated.password_hash.verify(Secret::new(old_password)).is_err());
    assert_eq!(updated.full_name.as_deref(), Some("Ada Lovelace"));
    // Untouched fields survive the patch
    assert_eq!(updated.api_key, created.api_key);
}

#[tokio::test]
async fn a_deleted_user_is_gone() {
    let app = spawn_app();
    let email: String = SafeEmail().fake();
    let password: String = Password(8..24).fake();

    let created = assert_ok!(
        app.users
            .create(&email, Secret::new(password), None, Role::User)
            .await
    );

    assert_ok!(app.users.delete(created.id).await);

    let result = app.users.get_by_id(created.id).await;
    assert!(matches!(result, Err(UserRepositoryError::NotFound(_))));
    let found = assert_ok!(app.users.find_by_email(&email).await);
    assert_none!(found);
}

#[tokio::test]
async fn listed_users_carry_their_roles() {
    let app = spawn_app();
    let password: String = Password(8..24).fake();

    assert_ok!(
        app.users
            .create(
                &SafeEmail().fake::<String>(),
                Secret::new(password.clone()),
                Some("The Admin".into()),
                Role::Admin,
            )
            .await
    );
    assert_ok!(
        app.users
            .create(
                &SafeEmail().fake::<String>(),
                Secret::new(password),
                None,
                Role::User,
            )
            .await
    );

    let users = assert_ok!(app.users.list().await);
    assert_eq!(users.len(), 2);
    assert!(users.iter().any(|u| u.role == Role::Admin));
    assert!(users.iter().any(|u| u.role == Role::User));
}
