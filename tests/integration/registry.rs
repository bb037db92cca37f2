//! Registration against the validation endpoint.

use crate::mock_server::MockServerFixture;
use chatfn::functions::{FunctionDescriptor, ParameterDescriptor, ToolFunction};
use chatfn::{BoxError, Error};
use mockito::Matcher;
use tokio_util::sync::CancellationToken;

fn echo(name: &str) -> ToolFunction {
    let descriptor = FunctionDescriptor::new(name)
        .description("Echo the input back")
        .param(ParameterDescriptor::new::<String>("text"));
    ToolFunction::new(descriptor, |text: String| Ok::<_, BoxError>(text)).unwrap()
}

#[tokio::test]
async fn accepted_function_is_listed() {
    let mut fixture = MockServerFixture::new().await;
    let validate = fixture
        .mock_json(
            "/functions/validate",
            Matcher::PartialJsonString(
                r#"{"name":"echo","parameters":{"type":"object","required":["text"]}}"#.to_string(),
            ),
            r#"{"status":200,"message":"Function is valid","json_ai_rules_version":"1.0.5",
                "warnings":[{"description":"few_shot_examples are recommended","schema_location":"(root)"}]}"#,
        )
        .await;

    let client = fixture.client();
    let registered = client
        .register_function(echo("echo"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(registered.name, "echo");
    assert!(registered.validation.has_warnings());
    assert_eq!(registered.validation.rules_version.as_deref(), Some("1.0.5"));
    assert!(client.registry().lookup("echo").is_some());
    assert_eq!(client.registry().names(), ["echo"]);
    validate.assert_async().await;
}

#[tokio::test]
async fn rejected_function_is_not_registered() {
    let mut fixture = MockServerFixture::new().await;
    let _validate = fixture
        .mock_json(
            "/functions/validate",
            Matcher::Any,
            r#"{"status":200,"message":"Function is invalid",
                "errors":[{"description":"description is required","schema_location":"(root)"}]}"#,
        )
        .await;

    let client = fixture.client();
    let err = client
        .register_function(echo("echo"), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::FunctionRejected { schema, validation } => {
            assert_eq!(schema.name, "echo");
            assert_eq!(
                validation.errors.unwrap()[0].description,
                "description is required"
            );
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(client.registry().lookup("echo").is_none());
    assert!(client.registry().is_empty());
}

#[tokio::test]
async fn server_error_is_a_remote_validation_failure() {
    let mut fixture = MockServerFixture::new().await;
    let _validate = fixture
        .server
        .mock("POST", "/functions/validate")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let client = fixture.client();
    let err = client
        .register_function(echo("echo"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::RemoteValidation { status: Some(500), ref function, .. } if function == "echo"
    ));
    assert!(client.registry().is_empty());
}

#[tokio::test]
async fn malformed_verdict_is_a_remote_validation_failure() {
    let mut fixture = MockServerFixture::new().await;
    let _validate = fixture
        .mock_json("/functions/validate", Matcher::Any, "not json")
        .await;

    let client = fixture.client();
    let err = client
        .register_function(echo("echo"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RemoteValidation { status: None, .. }));
}

#[tokio::test]
async fn registering_twice_replaces_the_entry() {
    let mut fixture = MockServerFixture::new().await;
    let _validate = fixture
        .server
        .mock("POST", "/functions/validate")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status":200,"message":"ok"}"#)
        .expect(2)
        .create_async()
        .await;

    let client = fixture.client();
    let cancel = CancellationToken::new();
    let first = client.register_function(echo("echo"), &cancel).await.unwrap();

    let descriptor = FunctionDescriptor::new("echo")
        .description("Echo twice")
        .param(ParameterDescriptor::new::<String>("text"));
    let twice = ToolFunction::new(descriptor, |text: String| {
        Ok::<_, BoxError>(format!("{0} {0}", text))
    })
    .unwrap();
    client.register_function(twice, &cancel).await.unwrap();

    assert_eq!(client.registry().len(), 1);
    let current = client.registry().lookup("echo").unwrap();
    assert_eq!(current.description.as_deref(), Some("Echo twice"));
    assert_eq!(first.description.as_deref(), Some("Echo the input back"));
}

#[tokio::test]
async fn rejected_re_registration_keeps_the_previous_entry() {
    let mut fixture = MockServerFixture::new().await;
    let accepted = fixture
        .mock_json(
            "/functions/validate",
            Matcher::Regex("Echo the input back".to_string()),
            r#"{"status":200,"message":"Function is valid"}"#,
        )
        .await;
    let rejected = fixture
        .mock_json(
            "/functions/validate",
            Matcher::Regex("Echo loudly".to_string()),
            r#"{"status":200,"message":"Function is invalid",
                "errors":[{"description":"few_shot_examples are malformed","schema_location":"(root)"}]}"#,
        )
        .await;

    let client = fixture.client();
    let cancel = CancellationToken::new();
    client.register_function(echo("echo"), &cancel).await.unwrap();

    let descriptor = FunctionDescriptor::new("echo")
        .description("Echo loudly")
        .param(ParameterDescriptor::new::<String>("text"));
    let loud = ToolFunction::new(descriptor, |text: String| {
        Ok::<_, BoxError>(text.to_uppercase())
    })
    .unwrap();
    let err = client.register_function(loud, &cancel).await.unwrap_err();

    assert!(matches!(err, Error::FunctionRejected { .. }));
    assert_eq!(client.registry().len(), 1);
    let current = client.registry().lookup("echo").unwrap();
    assert_eq!(current.description.as_deref(), Some("Echo the input back"));
    accepted.assert_async().await;
    rejected.assert_async().await;
}

#[tokio::test]
async fn validation_alone_does_not_register() {
    let mut fixture = MockServerFixture::new().await;
    let _validate = fixture.mock_validation_ok().await;

    let client = fixture.client();
    let verdict = client
        .validate_function(&echo("echo"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(verdict.is_correct());
    assert!(client.registry().is_empty());
}
