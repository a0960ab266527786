//! Generation job lifecycle against a scripted transport

use super::test_utils::{envelope, ok, service, settings, shop_dialogue, text_of, Scripted, ScriptedTransport};
use dialogue_gen::config::GenerationSettings;
use dialogue_gen::error::{GenerationError, TransportError, TransportFailureKind};
use dialogue_gen::generation::{GenerationService, JobOutcome, JobState};
use dialogue_gen::provider::HttpResponse;
use std::sync::Arc;
use tokio::sync::Notify;

const REPLY: &str = r#"{"dialogueLines":[
    {"id":1,"spokenByPlayer":false,"text":"It begins.","parentId":-1},
    {"id":2,"spokenByPlayer":true,"text":"What do you sell?","parentId":1},
    {"id":3,"spokenByPlayer":false,"text":"Rope, lamps and bread.","parentId":2},
    {"id":4,"spokenByPlayer":true,"text":"Hi there!","parentId":1}
]}"#;

#[tokio::test]
async fn test_successful_generation_fills_placeholders_only() {
    let graph = shop_dialogue();
    let transport = ScriptedTransport::new([ok(REPLY)]);
    let service = service(transport.clone());

    let outcome = service
        .spawn_generation(&graph, [1, 2, 3, 4])
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(outcome.state(), JobState::Done);
    let report = outcome.report().unwrap();
    assert_eq!(report.applied, vec![2, 3]);
    assert_eq!(report.start, vec![1]);
    assert_eq!(report.authored, vec![4]);

    assert_eq!(text_of(&graph, 1), "");
    assert_eq!(text_of(&graph, 2), "What do you sell?");
    assert_eq!(text_of(&graph, 3), "Rope, lamps and bread.");
    assert_eq!(text_of(&graph, 4), "Hello");

    let stats = outcome.stats().unwrap();
    assert_eq!(stats.model, "gpt-4-0613");
    assert_eq!(stats.prompt_tokens, Some(321));
    assert_eq!(stats.completion_tokens, Some(54));

    assert!(graph.take_refresh_details());
    assert!(!graph.is_generating());
    assert!(service.jobs().is_empty());

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].header("Authorization"), Some("Bearer sk-integration"));
    assert_eq!(requests[0].header("Content-Type"), Some("application/json"));
}

#[tokio::test]
async fn test_rate_limited_request_fails_without_mutation() {
    let graph = shop_dialogue();
    let before = graph.snapshot();
    let transport = ScriptedTransport::new([Scripted::Respond(HttpResponse::new(
        429,
        r#"{"error":{"message":"Rate limit reached"}}"#,
    ))]);

    let outcome = service(transport)
        .spawn_generation(&graph, [2, 3])
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(outcome.state(), JobState::Failed);
    assert!(matches!(
        outcome.error(),
        Some(GenerationError::Status { status: 429, .. })
    ));
    assert!(!graph.is_generating());
    assert_eq!(graph.snapshot().nodes(), before.nodes());
    assert!(!graph.take_refresh_details());
}

#[tokio::test]
async fn test_connection_failure_reports_reason() {
    let graph = shop_dialogue();
    let transport = ScriptedTransport::new([Scripted::Fail(TransportError::connection(
        "connection refused",
    ))]);

    let outcome = service(transport)
        .spawn_generation(&graph, [2])
        .unwrap()
        .wait()
        .await
        .unwrap();

    match outcome {
        JobOutcome::Failed {
            error: GenerationError::Transport(err),
            ..
        } => assert_eq!(err.kind, TransportFailureKind::Connection),
        other => panic!("expected transport failure, got {:?}", other),
    }
    assert!(!graph.is_generating());
}

#[tokio::test(start_paused = true)]
async fn test_hung_request_times_out_and_releases_graph() {
    let graph = shop_dialogue();
    let transport = ScriptedTransport::new([Scripted::Hang]);

    let outcome = service(transport)
        .spawn_generation(&graph, [2])
        .unwrap()
        .wait()
        .await
        .unwrap();

    match outcome.error() {
        Some(GenerationError::Transport(err)) => assert_eq!(err.kind, TransportFailureKind::TimedOut),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(!graph.is_generating());
}

#[tokio::test]
async fn test_second_launch_is_rejected_while_first_runs() {
    let graph = shop_dialogue();
    let gate = Arc::new(Notify::new());
    let transport = ScriptedTransport::gated([ok(REPLY), ok(REPLY)], gate.clone());
    let service = service(transport);

    let first = service.spawn_generation(&graph, [2, 3]).unwrap();
    assert!(graph.is_generating());
    assert!(!service.launch_generation(&graph, [2, 3]));
    assert!(matches!(
        service.spawn_generation(&graph, [2]),
        Err(GenerationError::AlreadyGenerating)
    ));

    let active = service.jobs().active_jobs();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].job_id, first.job_id());
    assert_eq!(active[0].selected_count, 2);

    gate.notify_one();
    let outcome = first.wait().await.unwrap();
    assert_eq!(outcome.report().unwrap().applied, vec![2, 3]);
    assert!(!graph.is_generating());

    // The graph is free again once the first job ended
    gate.notify_one();
    assert!(service.launch_generation(&graph, [2, 3]));
}

#[tokio::test]
async fn test_teardown_during_request_drops_the_reply() {
    let graph = shop_dialogue();
    let gate = Arc::new(Notify::new());
    let transport = ScriptedTransport::gated([ok(REPLY)], gate.clone());

    let handle = service(transport.clone()).spawn_generation(&graph, [2, 3]).unwrap();
    // Let the job reach the transport before tearing the owner down
    while transport.requests().is_empty() {
        tokio::task::yield_now().await;
    }
    graph.invalidate();
    gate.notify_one();

    let outcome = handle.wait().await.unwrap();
    assert!(matches!(outcome.error(), Some(GenerationError::StaleReference)));
    assert_eq!(text_of(&graph, 2), "(ask)");
    assert_eq!(text_of(&graph, 3), "");
    assert!(!graph.is_generating());
}

#[tokio::test]
async fn test_envelope_errors_complete_without_merge() {
    for (body, expect_missing_field) in [
        ("<html>502 Bad Gateway</html>".to_string(), false),
        (
            r#"{"error":{"message":"You exceeded your current quota"}}"#.to_string(),
            true,
        ),
    ] {
        let graph = shop_dialogue();
        let transport = ScriptedTransport::new([Scripted::Respond(HttpResponse::new(200, body))]);

        let outcome = service(transport)
            .spawn_generation(&graph, [2, 3])
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(outcome.state(), JobState::Done);
        let error = outcome.error().unwrap();
        assert!(error.is_envelope_error());
        assert_eq!(
            matches!(error, GenerationError::EnvelopeMissingField { .. }),
            expect_missing_field
        );
        assert_eq!(text_of(&graph, 2), "(ask)");
        assert!(!graph.is_generating());
    }
}

#[tokio::test]
async fn test_malformed_content_is_distinct_from_envelope_error() {
    let graph = shop_dialogue();
    let transport = ScriptedTransport::new([ok("Sorry, I can only answer in prose.")]);

    let outcome = service(transport)
        .spawn_generation(&graph, [2, 3])
        .unwrap()
        .wait()
        .await
        .unwrap();

    let error = outcome.error().unwrap();
    assert!(error.is_content_error());
    assert!(!error.is_envelope_error());
    assert!(outcome.stats().is_some());
    assert_eq!(text_of(&graph, 3), "");
    assert!(!graph.is_generating());
}

#[tokio::test]
async fn test_lines_outside_selection_are_never_written() {
    let graph = shop_dialogue();
    let transport = ScriptedTransport::new([ok(REPLY)]);

    let outcome = service(transport)
        .spawn_generation(&graph, [2])
        .unwrap()
        .wait()
        .await
        .unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.applied, vec![2]);
    assert_eq!(report.unselected, vec![3, 4]);
    assert_eq!(text_of(&graph, 3), "");
}

#[tokio::test]
async fn test_unresolvable_client_never_claims_graph() {
    let graph = shop_dialogue();
    let transport = ScriptedTransport::new([ok(REPLY)]);
    let service = GenerationService::new(
        GenerationSettings {
            client: "does-not-exist".to_string(),
            ..settings()
        },
        transport.clone(),
    );

    assert!(!service.launch_generation(&graph, [2]));
    assert!(!graph.is_generating());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_reply_with_empty_body_fails() {
    let graph = shop_dialogue();
    let transport = ScriptedTransport::new([Scripted::Respond(HttpResponse::new(200, ""))]);

    let outcome = service(transport)
        .spawn_generation(&graph, [2])
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert!(matches!(outcome.error(), Some(GenerationError::EmptyResponse)));
    assert_eq!(outcome.state(), JobState::Failed);
    // Keep the helper honest about what a real reply looks like
    assert!(envelope("{}").contains("\"model\""));
}
