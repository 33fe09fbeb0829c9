//! Tests for DriveClient and the content clients with mocked HTTP responses.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use drive_preview::access::{ClientConfig, ContentAccess, ContentClient};
use drive_preview::auth::{OwnerCredential, Reauthenticate};
use drive_preview::client::{http_client, DriveClient, DEFAULT_TIMEOUT};
use drive_preview::error::DriveError;
use drive_preview::models::{DriveEntry, FileListResponse, ServiceAccountCredentials};
use drive_preview::token::{ResourceType, ShareSecret, TokenService};
use drive_preview::{AccessContext, ContentCache, LoadState, Navigator, ServiceAccountAuth};
use mockito::{Matcher, Server};
use serde_json::json;
use tempfile::NamedTempFile;

struct CountingReauth {
    calls: AtomicUsize,
}

#[async_trait]
impl Reauthenticate for CountingReauth {
    async fn reauthenticate(&self) -> drive_preview::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("fresh".to_string())
    }
}

fn owner_client(base: &str, reauth: Option<Arc<CountingReauth>>) -> DriveClient {
    let credential = match reauth {
        Some(reauth) => OwnerCredential::with_reauth("stale", reauth),
        None => OwnerCredential::new("stale"),
    };
    DriveClient::with_base(
        Arc::new(credential),
        http_client(DEFAULT_TIMEOUT).unwrap(),
        base,
    )
}

fn entry_json(id: &str, parents: &[&str]) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("{}.stl", id),
        "mimeType": "application/octet-stream",
        "parents": parents,
    })
}

mod reauthentication {
    use super::*;

    #[tokio::test]
    async fn retries_once_with_renewed_token() {
        let mut server = Server::new_async().await;
        let rejected = server
            .mock("GET", "/files/abc")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer stale")
            .with_status(401)
            .create_async()
            .await;
        let accepted = server
            .mock("GET", "/files/abc")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer fresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(entry_json("abc", &["root"]).to_string())
            .create_async()
            .await;

        let reauth = Arc::new(CountingReauth {
            calls: AtomicUsize::new(0),
        });
        let client = owner_client(&server.url(), Some(reauth.clone()));

        let entry = client.get_file("abc").await.unwrap();
        assert_eq!(entry.id, "abc");
        assert_eq!(entry.parents, vec!["root"]);
        assert_eq!(reauth.calls.load(Ordering::SeqCst), 1);

        rejected.assert_async().await;
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn second_rejection_is_authentication_expired() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/files/abc")
            .match_query(Matcher::Any)
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        let reauth = Arc::new(CountingReauth {
            calls: AtomicUsize::new(0),
        });
        let client = owner_client(&server.url(), Some(reauth.clone()));

        let err = client.get_file("abc").await.unwrap_err();
        assert!(matches!(err, DriveError::AuthenticationExpired));
        assert_eq!(reauth.calls.load(Ordering::SeqCst), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn without_reauth_the_api_error_propagates() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/files/abc")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(json!({"error": {"code": 401, "message": "Invalid Credentials"}}).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = owner_client(&server.url(), None);
        match client.get_file("abc").await.unwrap_err() {
            DriveError::ApiError { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid Credentials");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
    #[tokio::test]
    async fn relayed_rejection_renews_once_for_a_navigator() {
        let mut gateway = Server::new_async().await;
        let rejected = gateway
            .mock("POST", "/drive-proxy")
            .match_header("authorization", "Bearer stale")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(json!({"error": {"code": 401, "message": "Invalid Credentials"}}).to_string())
            .expect(1)
            .create_async()
            .await;
        let accepted = gateway
            .mock("POST", "/drive-proxy")
            .match_header("authorization", "Bearer fresh")
            .match_body(Matcher::PartialJson(json!({"method": "GET"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"files": [entry_json("dragon", &["root"])]}).to_string())
            .expect(1)
            .create_async()
            .await;

        let reauth = Arc::new(CountingReauth {
            calls: AtomicUsize::new(0),
        });
        let config = ClientConfig {
            gateway_url: Some(gateway.url()),
            use_relay: true,
            ..Default::default()
        };
        let client =
            ContentClient::with_reauth(AccessContext::Owner("stale".to_string()), &config, reauth.clone())
                .unwrap();

        let mut nav = Navigator::new(client, Arc::new(ContentCache::new()));
        nav.initialize("root", "Workshop").await.unwrap();

        assert_eq!(nav.state(), &LoadState::Ready);
        assert_eq!(nav.contents().stl_files.len(), 1);
        assert_eq!(nav.contents().stl_files[0].id, "dragon");
        assert_eq!(reauth.calls.load(Ordering::SeqCst), 1);

        rejected.assert_async().await;
        accepted.assert_async().await;
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn follows_every_page() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/files")
            .match_query(Matcher::Regex("supportsAllDrives=true$".to_string()))
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "files": [entry_json("a", &["root"])],
                    "nextPageToken": "p2"
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/files")
            .match_query(Matcher::Regex("pageToken=p2$".to_string()))
            .with_header("content-type", "application/json")
            .with_body(json!({"files": [entry_json("b", &["root"])]}).to_string())
            .create_async()
            .await;

        let client = owner_client(&server.url(), None);
        let entries = client.list_children("root").await.unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn list_contents_partitions_entries() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/files")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"files": [
                    {"id": "f", "name": "Dragons", "mimeType": "application/vnd.google-apps.folder"},
                    {"id": "i", "name": "dragon.png", "mimeType": "image/png"},
                    {"id": "s", "name": "Dragon.STL", "mimeType": "application/octet-stream"},
                    {"id": "o", "name": "notes.txt", "mimeType": "text/plain"}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let client = owner_client(&server.url(), None);
        let contents = client.list_contents("root").await.unwrap();
        assert_eq!(contents.folders[0].id, "f");
        assert_eq!(contents.images[0].id, "i");
        assert_eq!(contents.stl_files[0].id, "s");
        assert_eq!(contents.len(), 3);
    }

    #[tokio::test]
    async fn relay_carries_target_url_and_owner_credential() {
        let mut server = Server::new_async().await;
        let relay = server
            .mock("POST", "/drive-proxy")
            .match_header("authorization", "Bearer stale")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({"method": "GET"})),
                Matcher::Regex(r#""url":"https://www.googleapis.com/drive/v3/files\?q="#.to_string()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(json!({"files": [entry_json("a", &["root"])]}).to_string())
            .create_async()
            .await;

        let client = owner_client("https://www.googleapis.com/drive/v3", None)
            .with_relay(format!("{}/drive-proxy", server.url()));
        let entries = client.list_children("root").await.unwrap();
        assert_eq!(entries.len(), 1);
        relay.assert_async().await;
    }
}

mod scope {
    use super::*;

    async fn parent_chain(server: &mut Server) {
        for (id, parents) in [
            ("sub2", vec!["sub1"]),
            ("sub1", vec!["root"]),
            ("other", vec!["elsewhere"]),
            ("elsewhere", vec![]),
        ] {
            server
                .mock("GET", format!("/files/{}", id).as_str())
                .match_query(Matcher::Any)
                .with_header("content-type", "application/json")
                .with_body(entry_json(id, &parents).to_string())
                .create_async()
                .await;
        }
    }

    #[tokio::test]
    async fn descendant_is_within_ancestor() {
        let mut server = Server::new_async().await;
        parent_chain(&mut server).await;
        let client = owner_client(&server.url(), None);

        assert!(client.is_within("sub2", "root", 32).await.unwrap());
        assert!(client.is_within("root", "root", 0).await.unwrap());
        assert!(!client.is_within("other", "root", 32).await.unwrap());
    }

    #[tokio::test]
    async fn depth_bound_stops_the_walk() {
        let mut server = Server::new_async().await;
        parent_chain(&mut server).await;
        let client = owner_client(&server.url(), None);

        assert!(!client.is_within("sub2", "root", 1).await.unwrap());
        assert!(client.is_within("sub2", "root", 2).await.unwrap());
    }
}

mod content_clients {
    use super::*;

    fn folder_token(secret: &str) -> String {
        TokenService::new(ShareSecret::new(secret).unwrap())
            .issue("shared", ResourceType::Folder, 10)
            .unwrap()
    }

    #[tokio::test]
    async fn direct_client_lists_with_owner_credential() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/files")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer owner-token")
            .with_header("content-type", "application/json")
            .with_body(json!({"files": [entry_json("a", &["root"])]}).to_string())
            .create_async()
            .await;

        let config = ClientConfig {
            drive_api_base: server.url(),
            ..Default::default()
        };
        let client = ContentClient::from_credential("owner-token", &config).unwrap();
        let entries = client.list_folder_contents("root").await.unwrap();
        assert_eq!(entries[0].id, "a");
    }

    #[tokio::test]
    async fn proxied_client_flattens_gateway_listing() {
        let mut server = Server::new_async().await;
        let token = folder_token("k");
        let mock = server
            .mock("GET", "/share/folder")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("token".into(), token.clone()),
                Matcher::UrlEncoded("folderId".into(), "sub".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "folders": [{"id": "f", "name": "Inner", "mimeType": "application/vnd.google-apps.folder"}],
                    "images": [{"id": "i", "name": "a.png", "mimeType": "image/png"}],
                    "stlFiles": [{"id": "s", "name": "a.stl"}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let config = ClientConfig {
            gateway_url: Some(server.url()),
            ..Default::default()
        };
        let client = ContentClient::from_credential(&format!("preview:{}", token), &config).unwrap();
        let entries = client.list_folder_contents("sub").await.unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["f", "i", "s"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn proxied_client_reports_expired_share() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/share/folder")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(json!({"error": "Token expired", "expired": true}).to_string())
            .create_async()
            .await;

        let config = ClientConfig {
            gateway_url: Some(server.url()),
            ..Default::default()
        };
        let client =
            ContentClient::from_credential(&format!("preview:{}", folder_token("k")), &config)
                .unwrap();
        let err = client.list_folder_contents("shared").await.unwrap_err();
        assert!(matches!(err, DriveError::ShareExpired));
    }

    #[tokio::test]
    async fn proxied_client_surfaces_other_gateway_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/share/folder")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(json!({"error": "Resource x is not part of the shared folder"}).to_string())
            .create_async()
            .await;

        let config = ClientConfig {
            gateway_url: Some(server.url()),
            ..Default::default()
        };
        let client =
            ContentClient::from_credential(&format!("preview:{}", folder_token("k")), &config)
                .unwrap();
        match client.list_folder_contents("x").await.unwrap_err() {
            DriveError::GatewayError { status, message } => {
                assert_eq!(status, 403);
                assert!(message.contains("not part of the shared folder"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

mod models {
    use super::*;

    #[test]
    fn drive_entry_accepts_string_and_number_sizes() {
        let from_text: DriveEntry =
            serde_json::from_value(json!({"id": "a", "name": "x.stl", "size": "2048"})).unwrap();
        let from_number: DriveEntry =
            serde_json::from_value(json!({"id": "a", "name": "x.stl", "size": 2048})).unwrap();
        assert_eq!(from_text.size, Some(2048));
        assert_eq!(from_number.size, Some(2048));
        assert!(from_text.mime_type.is_empty());
        assert!(from_text.parents.is_empty());
    }

    #[test]
    fn file_list_without_files_is_empty() {
        let response: FileListResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.files.is_empty());
        assert!(response.next_page_token.is_none());
    }

    #[test]
    fn drive_entry_display() {
        let mut entry = DriveEntry::new("abc123", "dragon.stl", "application/octet-stream");
        entry.size = Some(1048576);
        let display = entry.to_string();
        assert!(display.contains("abc123"));
        assert!(display.contains("1.00 MB"));
        assert!(display.contains("dragon.stl"));

        let folder = DriveEntry::new("f1", "Models", "");
        assert!(folder.to_string().contains("-"));
    }
}

mod credentials {
    use super::*;

    #[test]
    fn credentials_from_json() {
        let creds: ServiceAccountCredentials = serde_json::from_value(json!({
            "client_email": "gateway@project.iam.gserviceaccount.com",
            "private_key": "key",
            "token_uri": "https://oauth2.googleapis.com/token"
        }))
        .unwrap();
        assert_eq!(creds.client_email, "gateway@project.iam.gserviceaccount.com");
        assert_eq!(
            creds.token_uri.as_deref(),
            Some("https://oauth2.googleapis.com/token")
        );
    }

    #[test]
    fn service_account_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let creds_json = json!({
            "client_email": "gateway@project.iam.gserviceaccount.com",
            "private_key": "key"
        });
        temp_file.write_all(creds_json.to_string().as_bytes()).unwrap();

        let auth = ServiceAccountAuth::from_file(temp_file.path()).unwrap();
        assert_eq!(auth.client_email(), "gateway@project.iam.gserviceaccount.com");
    }

    #[test]
    fn service_account_from_bad_files() {
        assert!(matches!(
            ServiceAccountAuth::from_file("/nonexistent/credentials.json"),
            Err(DriveError::CredentialsFileError(_))
        ));

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"not valid json").unwrap();
        assert!(matches!(
            ServiceAccountAuth::from_file(temp_file.path()),
            Err(DriveError::CredentialsParseError(_))
        ));
    }
}
