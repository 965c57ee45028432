use serde_json::json;
use uuid::Uuid;

use crate::common::{TestApp, routes};

mod upload {
    use super::*;

    #[tokio::test]
    async fn local_upload_round_trip() {
        let app = TestApp::spawn().await;
        let token = app.token_for(1);

        let res = app
            .post_with_token(routes::TOKEN, &json!({ "file_name": "my photo.png" }), &token)
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["provider"], "local");
        assert_eq!(res.body["path"], "my_photo.png");
        let resource_id = res.body["resource_id"].as_str().unwrap().to_string();
        let session = res.body["session"].as_str().unwrap().to_string();

        let res = app
            .get_with_token(&routes::resource(&resource_id), &token)
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["reserved"], true);
        assert_eq!(res.body["size"], 0);

        let res = app
            .upload_with_token(&session, b"PNG_DATA".to_vec(), &token)
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.id(), resource_id);
        assert_eq!(res.body["size"], 8);
        assert_eq!(res.body["reserved"], false);

        let res = app.get_without_token("/files/1/my_photo.png").await;
        assert_eq!(res.status, 200);
        assert_eq!(res.text, "PNG_DATA");
    }

    #[tokio::test]
    async fn session_is_single_use() {
        let app = TestApp::spawn().await;
        let token = app.token_for(1);

        let res = app
            .post_with_token(routes::TOKEN, &json!({ "file_name": "a.txt" }), &token)
            .await;
        let session = res.body["session"].as_str().unwrap().to_string();

        let first = app.upload_with_token(&session, b"one".to_vec(), &token).await;
        assert_eq!(first.status, 201);
        let second = app.upload_with_token(&session, b"two".to_vec(), &token).await;
        assert_eq!(second.status, 400);
        assert_eq!(second.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn session_of_another_user_is_rejected() {
        let app = TestApp::spawn().await;
        let alice = app.token_for(1);
        let bob = app.token_for(2);

        let res = app
            .post_with_token(routes::TOKEN, &json!({ "file_name": "a.txt" }), &alice)
            .await;
        let session = res.body["session"].as_str().unwrap().to_string();

        let res = app.upload_with_token(&session, b"evil".to_vec(), &bob).await;
        assert_eq!(res.status, 400);

        // Alice can still use her session.
        let res = app.upload_with_token(&session, b"good".to_vec(), &alice).await;
        assert_eq!(res.status, 201);
    }

    #[tokio::test]
    async fn upload_missing_fields_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.token_for(1);
        let res = app.upload_with_token("", Vec::new(), &token).await;
        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn multi_chunk_upload_is_stored_intact() {
        let app = TestApp::spawn().await;
        let token = app.token_for(1);
        let bytes: Vec<u8> = (0..60 * 1024).map(|i| (i % 251) as u8).collect();

        let res = app
            .post_with_token(routes::TOKEN, &json!({ "file_name": "blob.bin" }), &token)
            .await;
        let session = res.body["session"].as_str().unwrap().to_string();
        let res = app.upload_with_token(&session, bytes.clone(), &token).await;
        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["size"], bytes.len());

        let stored = app
            .client
            .get(format!("http://{}/files/1/blob.bin", app.addr))
            .send()
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(stored.as_ref(), bytes.as_slice());
    }

    #[tokio::test]
    async fn file_before_session_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.token_for(1);
        let res = app
            .post_with_token(routes::TOKEN, &json!({ "file_name": "a.txt" }), &token)
            .await;
        let session = res.body["session"].as_str().unwrap().to_string();

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(b"early".to_vec()))
            .text("session", session.clone());
        let res = app.upload_form(form, &token).await;
        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");

        // The session was not consumed.
        let res = app.upload_with_token(&session, b"late".to_vec(), &token).await;
        assert_eq!(res.status, 201, "{}", res.text);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.token_for(1);
        let res = app
            .post_with_token(routes::TOKEN, &json!({ "file_name": "big.bin" }), &token)
            .await;
        let session = res.body["session"].as_str().unwrap().to_string();

        // Over the 64 KiB storage limit but within the multipart allowance.
        let res = app
            .upload_with_token(&session, vec![0u8; 70 * 1024], &token)
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn invalid_file_name_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.token_for(1);
        let res = app
            .post_with_token(routes::TOKEN, &json!({ "file_name": "../passwd" }), &token)
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "INVALID_NAME");
    }

    #[tokio::test]
    async fn token_for_finalized_path_conflicts() {
        let app = TestApp::spawn().await;
        let token = app.token_for(1);
        app.upload_file("a.png", b"x", &token).await;

        let res = app
            .post_with_token(routes::TOKEN, &json!({ "file_name": "a.png" }), &token)
            .await;
        assert_eq!(res.status, 409);
        assert_eq!(res.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn finalize_records_reported_size() {
        let app = TestApp::spawn().await;
        let token = app.token_for(1);
        app.post_with_token(routes::TOKEN, &json!({ "file_name": "a.png" }), &token)
            .await;

        let res = app
            .post_with_token(
                routes::FINALIZE,
                &json!({ "path": "a.png", "size": 1234 }),
                &token,
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["size"], 1234);

        let res = app
            .post_with_token(
                routes::FINALIZE,
                &json!({ "path": "unknown.png", "size": 1 }),
                &token,
            )
            .await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn quota_blocks_new_tokens_once_exceeded() {
        let app = TestApp::spawn_with_capacity(10).await;
        let token = app.token_for(1);
        app.upload_file("a.bin", b"0123456789A", &token).await;

        let res = app.get_with_token(routes::USAGE, &token).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["used"], 11);
        assert_eq!(res.body["capacity"], 10);

        let res = app
            .post_with_token(routes::TOKEN, &json!({ "file_name": "b.bin" }), &token)
            .await;
        assert_eq!(res.status, 413);
        assert_eq!(res.code(), "QUOTA_EXCEEDED");
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn lists_only_own_resources_with_pagination() {
        let app = TestApp::spawn().await;
        let alice = app.token_for(1);
        let bob = app.token_for(2);
        for name in ["a.png", "b.png", "c.png"] {
            app.upload_file(name, b"data", &alice).await;
        }
        app.upload_file("d.png", b"data", &bob).await;

        let res = app
            .get_with_token(
                &format!("{}?per_page=2&by_create=true&desc=false", routes::RESOURCES),
                &alice,
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        let data = res.body["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["path"], "a.png");
        assert_eq!(data[1]["path"], "b.png");
        assert_eq!(res.body["pagination"]["page"], 0);
        assert_eq!(res.body["pagination"]["total"], 3);
        assert_eq!(res.body["pagination"]["total_pages"], 2);

        let res = app
            .get_with_token(
                &format!(
                    "{}?page=1&per_page=2&by_create=true&desc=false",
                    routes::RESOURCES
                ),
                &alice,
            )
            .await;
        let data = res.body["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["path"], "c.png");
    }

    #[tokio::test]
    async fn get_requires_valid_id_and_ownership() {
        let app = TestApp::spawn().await;
        let alice = app.token_for(1);
        let bob = app.token_for(2);
        let id = app.upload_file("a.png", b"data", &alice).await;

        let res = app.get_with_token(&routes::resource("not-a-uuid"), &alice).await;
        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "INVALID_ID");

        let res = app.get_with_token(&routes::resource(&id), &bob).await;
        assert_eq!(res.status, 404);
        assert_eq!(res.code(), "NOT_FOUND");
    }
}

mod references {
    use super::*;

    #[tokio::test]
    async fn referenced_resource_cannot_be_deleted() {
        let app = TestApp::spawn().await;
        let token = app.token_for(1);
        let id = app.upload_file("a.png", b"data", &token).await;
        let memory = Uuid::now_v7().to_string();

        let res = app.reconcile(&memory, "", "look: ![](a.png)", &token).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["added"], json!(["a.png"]));

        let res = app.get_with_token(&routes::resource(&id), &token).await;
        assert_eq!(res.body["refs"], json!([memory]));

        let res = app.delete_with_token(&routes::resource(&id), &token).await;
        assert_eq!(res.status, 409);
        assert_eq!(res.code(), "HAS_REFERENCE");

        let res = app.reconcile(&memory, "look: ![](a.png)", "", &token).await;
        assert_eq!(res.body["removed"], json!(["a.png"]));

        let res = app.delete_with_token(&routes::resource(&id), &token).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["deleted"], true);

        let res = app.get_with_token(&routes::resource(&id), &token).await;
        assert_eq!(res.status, 404);
        let res = app.get_without_token("/files/1/a.png").await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn reference_to_unknown_path_reserves_it() {
        let app = TestApp::spawn().await;
        let token = app.token_for(1);
        let memory = Uuid::now_v7().to_string();

        app.reconcile(&memory, "", "![](soon.png)", &token).await;

        let res = app.get_with_token(routes::RESOURCES, &token).await;
        let data = res.body["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["path"], "soon.png");
        assert_eq!(data[0]["reserved"], true);

        // The pending upload can still be made for that path.
        let res = app
            .post_with_token(routes::TOKEN, &json!({ "file_name": "soon.png" }), &token)
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["resource_id"], data[0]["id"]);
    }

    #[tokio::test]
    async fn delete_of_foreign_resource_is_denied() {
        let app = TestApp::spawn().await;
        let alice = app.token_for(1);
        let bob = app.token_for(2);
        let id = app.upload_file("a.png", b"data", &alice).await;

        let res = app.delete_with_token(&routes::resource(&id), &bob).await;
        assert_eq!(res.status, 403);
        assert_eq!(res.code(), "PERMISSION_DENIED");

        let res = app.get_with_token(&routes::resource(&id), &alice).await;
        assert_eq!(res.status, 200);
    }

    #[tokio::test]
    async fn render_rewrites_uploaded_references() {
        let app = TestApp::spawn().await;
        let token = app.token_for(1);
        app.upload_file("cat.png", b"meow", &token).await;

        let res = app
            .post_with_token(
                routes::RENDER,
                &json!({ "content": "![cat](cat.png) ![dog](dog.png)" }),
                &token,
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["content"], "![cat](/files/1/cat.png) ![dog](dog.png)");
    }
}

mod auth {
    use super::*;

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let app = TestApp::spawn().await;
        let res = app.get_without_token(routes::RESOURCES).await;
        assert_eq!(res.status, 401);
        assert_eq!(res.code(), "TOKEN_MISSING");
    }

    #[tokio::test]
    async fn invalid_token_is_rejected() {
        let app = TestApp::spawn().await;
        let res = app.get_with_token(routes::USAGE, "garbage").await;
        assert_eq!(res.status, 401);
        assert_eq!(res.code(), "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn ownership_follows_user_id_not_username() {
        let app = TestApp::spawn().await;
        let id = app.upload_file("a.png", b"x", &app.token_for(1)).await;

        let renamed = app.token_named(1, "someone-else");
        let res = app.get_with_token(&routes::resource(&id), &renamed).await;
        assert_eq!(res.status, 200, "{}", res.text);

        let impostor = app.token_named(2, "user1");
        let res = app.get_with_token(&routes::resource(&id), &impostor).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let app = TestApp::spawn().await;
        let res = app.get_without_token(routes::HEALTH).await;
        assert_eq!(res.status, 204);
    }
}
