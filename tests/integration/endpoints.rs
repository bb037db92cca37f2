//! Auxiliary service endpoints.

use crate::mock_server::MockServerFixture;
use chatfn::files::FileUpload;
use chatfn::tokens::total_tokens;
use mockito::Matcher;
use tokio_util::sync::CancellationToken;

const FILE: &str = r#"{"id":"f-1","object":"file","bytes":11,"created_at":1700000000,
    "filename":"notes.txt","purpose":"general","access_policy":"private"}"#;

#[tokio::test]
async fn embeddings_use_the_embeddings_model() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_json(
            "/embeddings",
            Matcher::PartialJsonString(r#"{"model":"Embeddings","input":["a","b"]}"#.to_string()),
            r#"{"object":"list","model":"Embeddings","data":[
                {"object":"embedding","index":0,"embedding":[0.1,0.2],"usage":{"prompt_tokens":3}},
                {"object":"embedding","index":1,"embedding":[0.3,0.4],"usage":{"prompt_tokens":4}}]}"#,
        )
        .await;

    let response = fixture
        .client()
        .embeddings(&["a", "b"], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.len(), 2);
    assert_eq!(response.first().unwrap().dimensions(), 2);
    assert_eq!(response.prompt_tokens(), 7);
    mock.assert_async().await;
}

#[tokio::test]
async fn tokens_are_counted_per_input() {
    let mut fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_json(
            "/tokens/count",
            Matcher::PartialJsonString(r#"{"model":"GigaChat","input":["hello world"]}"#.to_string()),
            r#"[{"object":"tokens","tokens":3,"characters":11}]"#,
        )
        .await;

    let counts = fixture
        .client()
        .tokens_count(&["hello world"], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(counts.len(), 1);
    assert_eq!(total_tokens(&counts), 3);
}

#[tokio::test]
async fn models_are_listed() {
    let mut fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_get(
            "/models",
            r#"{"object":"list","data":[{"id":"GigaChat","object":"model","owned_by":"salutedevices"},
                {"id":"GigaChat-Pro","object":"model","owned_by":"salutedevices"}]}"#,
        )
        .await;

    let models = fixture.client().models(&CancellationToken::new()).await.unwrap();
    let ids: Vec<&str> = models.data.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["GigaChat", "GigaChat-Pro"]);
}

#[tokio::test]
async fn file_lifecycle() {
    let mut fixture = MockServerFixture::new().await;
    let upload = fixture
        .server
        .mock("POST", "/files")
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/form-data; boundary=".to_string()),
        )
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="file"; filename="notes.txt""#.to_string()),
            Matcher::Regex(r#"name="purpose""#.to_string()),
            Matcher::Regex("hello notes".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(FILE)
        .create_async()
        .await;
    let _list = fixture
        .mock_get("/files", &format!(r#"{{"data":[{}]}}"#, FILE))
        .await;
    let _get = fixture.mock_get("/files/f-1", FILE).await;
    let _content = fixture
        .server
        .mock("GET", "/files/f-1/content")
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_body("hello notes")
        .create_async()
        .await;
    let _delete = fixture
        .mock_json("/files/f-1/delete", Matcher::Any, r#"{"id":"f-1","deleted":true}"#)
        .await;

    let client = fixture.client();
    let cancel = CancellationToken::new();

    let info = client
        .upload_file(
            FileUpload::new("notes.txt", "text/plain", b"hello notes".to_vec()),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(info.id, "f-1");
    upload.assert_async().await;

    let listed = client.files(&cancel).await.unwrap();
    assert_eq!(listed.data, vec![info.clone()]);
    assert_eq!(client.file("f-1", &cancel).await.unwrap(), info);
    assert_eq!(
        client.file_content("f-1", &cancel).await.unwrap().as_ref(),
        b"hello notes"
    );
    assert!(client.delete_file("f-1", &cancel).await.unwrap().deleted);
}

#[tokio::test]
async fn remote_errors_carry_the_status() {
    let mut fixture = MockServerFixture::new().await;
    let _mock = fixture
        .server
        .mock("GET", "/models")
        .with_status(401)
        .with_body(r#"{"status":401,"message":"Unauthorized"}"#)
        .create_async()
        .await;

    let err = fixture
        .client()
        .models(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, chatfn::Error::Remote { status: 401, .. }));
}
