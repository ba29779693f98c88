//! Test-loop driver against a scripted model and page.

use std::sync::Arc;

use forge_browser::{
    AccountStore, BrowserError, Page, ScriptedPage, TestLoopDriver, TestResult, TestSession,
};
use forge_chat::{ChatError, RetryPolicy, ScriptedModel};
use forge_core::{ExchangeRegistry, ProgressEvent, ProgressSink};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn session() -> TestSession {
    TestSession {
        application_id: "shop".to_string(),
        module: "web".to_string(),
        requirement: "Customers can sign up".to_string(),
        source: "@@ src/App.tsx @@\nexport const App = () => null;\n".to_string(),
    }
}

fn driver(model: &ScriptedModel, dir: &TempDir) -> TestLoopDriver {
    TestLoopDriver::new(Arc::new(model.clone()), AccountStore::new(dir.path()))
}

async fn open(page: &ScriptedPage) -> ScriptedPage {
    page.navigate("http://localhost/shop").await.unwrap();
    page.clone()
}

#[tokio::test]
async fn test_steps_then_accept() {
    let dir = TempDir::new().unwrap();
    let page = open(
        &ScriptedPage::new()
            .with_element("#signup")
            .with_element("#email")
            .on_click_reveal("#signup", "#welcome"),
    )
    .await;

    let model = ScriptedModel::new()
        .reply(
            "STEP\n{\"commands\": [{\"type\": \"fill\", \"selector\": \"#email\", \"value\": \"ada@example.com\"}, \
             {\"type\": \"click\", \"selector\": \"#signup\"}, {\"type\": \"expect_visible\", \"selector\": \"#welcome\"}], \
             \"accounts\": [{\"username\": \"ada@example.com\", \"password\": \"secret\"}]}",
        )
        .reply("ACCEPT\n{\"summary\": \"sign up works\"}");

    let result = driver(&model, &dir)
        .run(&page, &session(), &ProgressSink::detached(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        result,
        TestResult::Accepted {
            summary: "sign up works".to_string()
        }
    );
    assert!(page
        .actions()
        .ends_with(&["fill #email ada@example.com".to_string(), "click #signup".to_string()]));

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[0].attachments, 1);
    assert!(prompts[0].text.contains("Customers can sign up"));
    assert!(prompts[0].text.contains("Page target: http://localhost/shop"));
    assert!(prompts[1].text.contains("-> ok"));
    assert!(prompts[1].text.contains("username: ada@example.com"));

    let stored = AccountStore::new(dir.path()).load("shop");
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_failed_command_is_fed_back_then_reject() {
    let dir = TempDir::new().unwrap();
    let page = open(&ScriptedPage::new().with_console("Uncaught TypeError")).await;

    let model = ScriptedModel::new()
        .reply("STEP\n{\"commands\": [{\"type\": \"click\", \"selector\": \"#save\"}]}")
        .reply("REJECT\n{\"report\": \"There is no save button\"}");

    let result = driver(&model, &dir)
        .run(&page, &session(), &ProgressSink::detached(), &CancellationToken::new())
        .await
        .unwrap();

    match result {
        TestResult::Rejected(rejection) => {
            assert_eq!(rejection.module, "web");
            assert_eq!(rejection.report, "There is no save button");
            assert_eq!(rejection.console, "Uncaught TypeError");
            assert!(!rejection.screenshot.is_empty());
        }
        other => panic!("unexpected {:?}", other),
    }

    let second = &model.prompts()[1].text;
    assert!(second.contains("command 1 (click) failed"));
    assert!(second.contains("#save"));
}

#[tokio::test]
async fn test_step_budget_is_an_abort() {
    let dir = TempDir::new().unwrap();
    let page = open(&ScriptedPage::new().with_element("#next")).await;
    let model = ScriptedModel::responding(|_| {
        Ok("STEP\n{\"commands\": [{\"type\": \"click\", \"selector\": \"#next\"}]}".to_string())
    });

    let result = driver(&model, &dir)
        .with_max_steps(3)
        .run(&page, &session(), &ProgressSink::detached(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        result,
        TestResult::Aborted {
            reason: "step budget of 3 exhausted".to_string()
        }
    );
    assert_eq!(model.prompts().len(), 3);
}

#[tokio::test]
async fn test_unparsable_reply_costs_a_step() {
    let dir = TempDir::new().unwrap();
    let page = open(&ScriptedPage::new()).await;
    let model = ScriptedModel::new()
        .reply("Looks fine to me.")
        .reply("ABORT\n{\"reason\": \"page is blank\"}");

    let result = driver(&model, &dir)
        .run(&page, &session(), &ProgressSink::detached(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        result,
        TestResult::Aborted {
            reason: "page is blank".to_string()
        }
    );
    assert!(model.prompts()[1].text.contains("expected one of STEP"));
}

#[tokio::test]
async fn test_cancellation_mid_reply() {
    let dir = TempDir::new().unwrap();
    let page = open(&ScriptedPage::new()).await;
    let model = ScriptedModel::new().reply("ACCEPT\n{}\n").cancel_on_send(1);

    let err = driver(&model, &dir)
        .run(&page, &session(), &ProgressSink::detached(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BrowserError::Cancelled));
}

#[tokio::test]
async fn test_steps_are_reported_to_listener() {
    let dir = TempDir::new().unwrap();
    let registry = ExchangeRegistry::new();
    let handle = registry.register("ex-1").unwrap();
    let mut events = registry.attach("ex-1").unwrap();

    let page = open(&ScriptedPage::new()).await;
    let model = ScriptedModel::new().reply("ACCEPT");
    driver(&model, &dir)
        .run(&page, &session(), handle.sink(), handle.cancel_token())
        .await
        .unwrap();

    match events.try_recv().unwrap() {
        ProgressEvent::TestStep { module, step, action } => {
            assert_eq!((module.as_str(), step, action.as_str()), ("web", 1, "ACCEPT"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_transient_model_fault_is_retried() {
    let dir = TempDir::new().unwrap();
    let page = open(&ScriptedPage::new()).await;
    let model = ScriptedModel::new()
        .fail(ChatError::Stream("connection reset".to_string()))
        .reply("ACCEPT\n{\"summary\": \"works\"}");

    let result = driver(&model, &dir)
        .with_retry(RetryPolicy::immediate(2))
        .run(&page, &session(), &ProgressSink::detached(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(result, TestResult::Accepted { .. }));
    assert_eq!(model.prompts().len(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_surface_the_model_error() {
    let dir = TempDir::new().unwrap();
    let page = open(&ScriptedPage::new()).await;
    let model = ScriptedModel::new()
        .fail(ChatError::Stream("connection reset".to_string()))
        .fail(ChatError::Stream("connection reset".to_string()));

    let err = driver(&model, &dir)
        .with_retry(RetryPolicy::immediate(1))
        .run(&page, &session(), &ProgressSink::detached(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, BrowserError::Chat(ChatError::Stream(_))), "{:?}", err);
}
