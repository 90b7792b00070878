use httpmock::prelude::*;
use serde_json::json;

use starnarrator_canvas::adapters::{
    ChannelCredentials, ImageGenerator, ImageOptions, ResponseFormat, TaskStatus, TextEngine,
    TextEngineSettings, VideoGenerator, VideoOptions,
};
use starnarrator_canvas::remote::HttpGateway;
use starnarrator_canvas::AdapterError;

fn gateway() -> HttpGateway {
    HttpGateway::new().expect("client")
}

fn options() -> ImageOptions {
    ImageOptions {
        aspect_ratio: "16:9".into(),
        resolution: "1K".into(),
        seed: Some(42),
    }
}

#[tokio::test]
async fn image_task_submit_and_poll() {
    let server = MockServer::start_async().await;
    let submit = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/images/generations")
                .header("authorization", "Bearer token")
                .header("content-type", "application/json")
                .body_contains("\"model\":\"nano-banana\"")
                .body_contains("\"aspect_ratio\":\"16:9\"")
                .body_contains("\"seed\":42");
            then.status(200).json_body(json!({"task_id": "img-1"}));
        })
        .await;
    let poll = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/images/tasks/img-1")
                .header("authorization", "Bearer token");
            then.status(200).json_body(json!({
                "status": "SUCCESS",
                "result_urls": ["https://cdn.test/forest.png"]
            }));
        })
        .await;

    let channel = ChannelCredentials::new(server.base_url(), "token");
    let gateway = gateway();
    let id = ImageGenerator::submit(&gateway, &channel, "a forest", "nano-banana", &options())
        .await
        .expect("submit");
    assert_eq!(id, "img-1");
    submit.assert_async().await;

    let task = ImageGenerator::poll(&gateway, &channel, &id).await.expect("poll");
    assert_eq!(task.status, TaskStatus::Success);
    assert_eq!(task.first_url(), Some("https://cdn.test/forest.png"));
    poll.assert_async().await;
}

#[tokio::test]
async fn pro_image_urls_come_from_chat_content() {
    let server = MockServer::start_async().await;
    let chat = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("\"model\":\"gemini-3-pro-image-preview\"")
                .body_contains("https://cdn.test/knight.png");
            then.status(200).json_body(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": "Here it is ![shot](https://cdn.test/out.png)"
                    }
                }]
            }));
        })
        .await;

    let channel = ChannelCredentials::new(server.base_url(), "token");
    let urls = gateway()
        .generate_immediate(
            &channel,
            "a knight",
            "gemini-3-pro-image-preview",
            &["https://cdn.test/knight.png".to_string()],
            &options(),
        )
        .await
        .expect("generate");
    assert_eq!(urls, vec!["https://cdn.test/out.png"]);
    chat.assert_async().await;
}

#[tokio::test]
async fn video_submit_and_poll_progress() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/videos")
                .body_contains("\"model\":\"sora-2-landscape-10s\"");
            then.status(200).json_body(json!({"id": "vid-7"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/videos/vid-7");
            then.status(200).json_body(json!({
                "status": "in_progress",
                "progress": "45%"
            }));
        })
        .await;

    let channel = ChannelCredentials::new(format!("{}/", server.base_url()), "token");
    let gateway = gateway();
    let id = VideoGenerator::submit(
        &gateway,
        &channel,
        "waves",
        "sora-2-landscape-10s",
        &VideoOptions::default(),
    )
    .await
    .expect("submit");
    assert_eq!(id, "vid-7");

    let task = VideoGenerator::poll(&gateway, &channel, &id).await.expect("poll");
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.progress, Some(45.0));
    assert_eq!(task.video_url, None);
}

#[tokio::test]
async fn non_success_status_is_surfaced() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/videos/vid-8");
            then.status(502).body("upstream down");
        })
        .await;

    let channel = ChannelCredentials::new(server.base_url(), "token");
    let err = VideoGenerator::poll(&gateway(), &channel, "vid-8")
        .await
        .unwrap_err();
    match &err {
        AdapterError::Status { status, body } => {
            assert_eq!(*status, 502);
            assert_eq!(body, "upstream down");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn submit_without_task_id_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/images/generations");
            then.status(200).json_body(json!({"message": "queued"}));
        })
        .await;

    let channel = ChannelCredentials::new(server.base_url(), "token");
    let err = ImageGenerator::submit(&gateway(), &channel, "x", "nano-banana", &options())
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Rejected(_)));
}

#[tokio::test]
async fn text_engine_sends_json_schema() {
    let server = MockServer::start_async().await;
    let chat = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer llm-key")
                .body_contains("\"type\":\"json_schema\"")
                .body_contains("\"name\":\"script_analysis\"");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "content": "{\"characters\": []}" } }]
            }));
        })
        .await;

    let settings = TextEngineSettings {
        base_url: server.base_url(),
        api_key: "llm-key".into(),
        ..TextEngineSettings::default()
    };
    let format = ResponseFormat::JsonSchema {
        name: "script_analysis".into(),
        schema: json!({"type": "object"}),
    };
    let text = gateway()
        .chat(&settings, "system", "a script", &format)
        .await
        .expect("chat");
    assert_eq!(text, "{\"characters\": []}");
    chat.assert_async().await;
}
