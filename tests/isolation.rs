//! Tenant isolation and role checks across the API.

mod common;

use common::start_server;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_tenants_cannot_see_each_other() {
    let server = start_server().await;
    let acme = server.tenant("acme").await;
    let globex = server.tenant("globex").await;

    let lead = acme.create_lead(&json!({ "name": "Secret deal" })).await.unwrap();
    let id = lead["id"].as_str().unwrap();

    // Foreign ids look exactly like missing ones.
    let err = globex.get_lead(id).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    let err = globex
        .patch(&format!("/leads/{id}"), &json!({ "name": "Mine now" }))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    let page = globex.list_leads("").await.unwrap();
    assert_eq!(page["total"], 0);

    let activities = globex.get("/activities").await.unwrap();
    assert_eq!(activities["total"], 0);
}

#[tokio::test]
async fn test_cannot_assign_across_tenants() {
    let server = start_server().await;
    let acme = server.tenant("acme").await;
    let globex = server.tenant("globex").await;
    let (_, outsider) = server.user(&globex, "globex", "eve", "agent").await;

    let lead = acme.create_lead(&json!({ "name": "Cyberdyne" })).await.unwrap();
    let err = acme
        .assign(lead["id"].as_str().unwrap(), outsider["id"].as_str().unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));
    assert_eq!(err.code(), Some("validation_failed"));
}

#[tokio::test]
async fn test_role_permissions() {
    let server = start_server().await;
    let admin = server.tenant("acme").await;
    let (agent, _) = server.user(&admin, "acme", "carol", "agent").await;
    let (viewer, _) = server.user(&admin, "acme", "dave", "viewer").await;

    let err = viewer
        .create_lead(&json!({ "name": "Nope" }))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));

    let err = agent
        .create_user(&json!({
            "email": "x@acme.test", "name": "x", "role": "admin", "password": common::PASSWORD,
        }))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));

    // An agent only touches leads they own.
    let others = admin.create_lead(&json!({ "name": "Admin's lead" })).await.unwrap();
    let err = agent
        .patch(
            &format!("/leads/{}", others["id"].as_str().unwrap()),
            &json!({ "notes": "hijack" }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));

    let err = admin.get("/tenants").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
}

#[tokio::test]
async fn test_suspended_tenant_is_locked_out() {
    let server = start_server().await;
    let acme = server.tenant("acme").await;
    let operator = server.operator().await;

    let tenant = acme.me().await.unwrap()["tenant"].clone();
    operator
        .post(&format!("/tenants/{}/suspend", tenant["id"].as_str().unwrap()), &json!({}))
        .await
        .unwrap();

    let err = acme.me().await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));

    let mut again = server.client();
    let err = again
        .login("acme", "admin@acme.test", common::PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
}
