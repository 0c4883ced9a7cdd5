mod common;

use common::{question, Behaviour, MockClient};
use question_validator::config::Config;
use question_validator::models::load_questions_from_file;
use question_validator::utils::logging;
use question_validator::{
    BatchOrchestrator, Critique, LlmReasoningClient, LoopSettings, ProcessingResult, Question,
    WorkerPool,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

fn orchestrator(
    client: Arc<MockClient>,
    max_workers: usize,
    max_iterations: u32,
) -> BatchOrchestrator<MockClient> {
    BatchOrchestrator::new(WorkerPool::new(
        client,
        max_workers,
        LoopSettings {
            max_iterations,
            max_protocol_retries: 2,
        },
    ))
}

fn numbers(results: &[ProcessingResult]) -> Vec<&str> {
    results.iter().map(|r| r.question_number.as_str()).collect()
}

#[tokio::test]
async fn test_two_questions_sequential_with_single_worker() {
    let client = Arc::new(
        MockClient::new()
            .with("A", Behaviour::script(&["B"], vec![Critique::accept()]))
            .with(
                "B",
                Behaviour::script(
                    &["C", "D"],
                    vec![Critique::reject("C 不对"), Critique::accept()],
                ),
            ),
    );
    let orchestrator = orchestrator(Arc::clone(&client), 1, 3);

    let results = orchestrator
        .process(vec![
            question("A", &["A", "B", "C", "D"]),
            question("B", &["A", "B", "C", "D"]),
        ])
        .await;

    assert_eq!(numbers(&results), vec!["A", "B"]);
    assert_eq!(results[0].selected_answer.as_deref(), Some("B"));
    assert_eq!(results[0].validation_iterations, 1);
    assert_eq!(results[1].selected_answer.as_deref(), Some("D"));
    assert_eq!(results[1].validation_iterations, 2);
    assert!(results.iter().all(|r| r.error.is_none() && r.consensus_reached));

    // 并发上限为 1：同一时刻只有一个调用，且每道题的调用连续出现
    assert_eq!(client.max_in_flight(), 1);
    let log = client.call_log();
    assert_eq!(log.len(), 6);
    let switches = log.windows(2).filter(|w| w[0].0 != w[1].0).count();
    assert_eq!(switches, 1, "调用顺序: {:?}", log);
}

#[tokio::test]
async fn test_empty_batch_makes_no_calls() {
    let client = Arc::new(MockClient::new());
    let orchestrator = orchestrator(Arc::clone(&client), 5, 5);

    let results = orchestrator.process(Vec::new()).await;

    assert!(results.is_empty());
    assert_eq!(client.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_output_order_ignores_completion_order() {
    // 越靠前的题目越慢，完成顺序与输入顺序相反
    let mut client = MockClient::new();
    let mut questions = Vec::new();
    for i in 0..8u64 {
        let number = format!("Q{}", i);
        client = client.with_question_delay(&number, Duration::from_millis(5 * (8 - i)));
        questions.push(question(&number, &["甲", "乙"]));
    }
    let orchestrator = orchestrator(Arc::new(client), 8, 5);

    let results = orchestrator.process(questions.clone()).await;

    let expected: Vec<&str> = questions.iter().map(|q| q.question_number.as_str()).collect();
    assert_eq!(numbers(&results), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_worker_limit() {
    let client = Arc::new(MockClient::new().with_delay(Duration::from_millis(20)));
    let orchestrator = orchestrator(Arc::clone(&client), 3, 5);
    let questions: Vec<Question> = (0..12)
        .map(|i| question(&i.to_string(), &["x", "y"]))
        .collect();

    let results = orchestrator.process(questions).await;

    assert_eq!(results.len(), 12);
    assert_eq!(client.max_in_flight(), 3);
    assert_eq!(client.calls(), 24);
    // 所有槽位都已归还
    assert_eq!(orchestrator.pool().available_slots(), 3);
}

#[tokio::test]
async fn test_hard_failure_is_isolated_to_its_question() {
    let healthy = || {
        MockClient::new()
            .with(
                "1",
                Behaviour::script(
                    &["b", "c"],
                    vec![Critique::reject("再想想"), Critique::accept()],
                ),
            )
            .with("3", Behaviour::script(&["a"], vec![Critique::accept()]))
    };
    let options = ["a", "b", "c"];

    let baseline = orchestrator(Arc::new(healthy()), 2, 5)
        .process(vec![question("1", &options), question("3", &options)])
        .await;

    let with_failure = orchestrator(Arc::new(healthy().with("2", Behaviour::HardFailure)), 2, 5)
        .process(vec![
            question("1", &options),
            question("2", &options),
            question("3", &options),
        ])
        .await;

    assert_eq!(numbers(&with_failure), vec!["1", "2", "3"]);

    let failed = &with_failure[1];
    assert!(failed.selected_answer.is_none());
    assert!(failed.error.as_deref().unwrap().contains("connection refused"));

    for (expected, actual) in baseline.iter().zip([&with_failure[0], &with_failure[2]]) {
        assert_eq!(expected.selected_answer, actual.selected_answer);
        assert_eq!(expected.validation_iterations, actual.validation_iterations);
        assert!(actual.error.is_none());
    }
}

#[tokio::test]
async fn test_panicking_worker_yields_failed_result() {
    let client = Arc::new(MockClient::new().with("boom", Behaviour::Panic));
    let orchestrator = orchestrator(Arc::clone(&client), 2, 5);

    let results = orchestrator
        .process(vec![
            question("ok-1", &["x"]),
            question("boom", &["x"]),
            question("ok-2", &["x"]),
        ])
        .await;

    assert_eq!(numbers(&results), vec!["ok-1", "boom", "ok-2"]);
    assert!(results[0].is_success());
    assert!(results[1].error.is_some());
    assert!(results[2].is_success());
    assert_eq!(orchestrator.pool().available_slots(), 2);
}

#[tokio::test]
async fn test_always_reject_returns_best_effort_answer() {
    let client = Arc::new(MockClient::new().with(
        "q",
        Behaviour::AlwaysReject {
            answer: "乙".to_string(),
        },
    ));
    let orchestrator = orchestrator(Arc::clone(&client), 5, 4);

    let results = orchestrator.process(vec![question("q", &["甲", "乙"])]).await;

    let result = &results[0];
    assert_eq!(result.validation_iterations, 4);
    assert_eq!(result.selected_answer.as_deref(), Some("乙"));
    assert!(!result.consensus_reached);
    assert!(result.error.is_none());
    assert_eq!(client.calls(), 8);
}

#[tokio::test]
async fn test_accept_on_first_iteration_makes_exactly_two_calls() {
    let client = Arc::new(MockClient::new());
    let orchestrator = orchestrator(Arc::clone(&client), 5, 5);

    let results = orchestrator.process(vec![question("only", &["x", "y"])]).await;

    assert_eq!(results[0].validation_iterations, 1);
    assert_eq!(results[0].selected_answer.as_deref(), Some("x"));
    assert_eq!(client.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_result_invariants_hold_for_mixed_batch() {
    let max_iterations = 3;
    let client = Arc::new(
        MockClient::new()
            .with("r", Behaviour::AlwaysReject { answer: "y".to_string() })
            .with("f", Behaviour::HardFailure)
            .with("bad", Behaviour::script(&["zzz", "zzz", "zzz"], vec![]))
            .with(
                "s",
                Behaviour::script(&["x", "z"], vec![Critique::reject("no"), Critique::accept()]),
            ),
    );
    let orchestrator = orchestrator(Arc::clone(&client), 2, max_iterations);
    let questions = vec![
        question("r", &["x", "y", "z"]),
        question("f", &["x", "y", "z"]),
        question("ok", &["x", "y", "z"]),
        question("bad", &["x", "y", "z"]),
        question("s", &["x", "y", "z"]),
    ];

    let results = orchestrator.process(questions.clone()).await;

    assert_eq!(results.len(), questions.len());
    for (q, r) in questions.iter().zip(&results) {
        assert_eq!(q.question_number, r.question_number);
        assert!(r.validation_iterations <= max_iterations);
        if let Some(answer) = &r.selected_answer {
            assert!(q.answer.contains(answer), "{} 不在候选项中", answer);
        } else {
            assert!(r.error.is_some());
        }
    }
    // 连续无效提议是硬失败
    assert!(results[3].error.is_some());
    assert_eq!(results[4].selected_answer.as_deref(), Some("z"));
}

#[tokio::test]
async fn test_duplicate_question_numbers_are_kept_apart() {
    let client = Arc::new(MockClient::new());
    let orchestrator = orchestrator(Arc::clone(&client), 2, 5);

    let results = orchestrator
        .process(vec![question("7", &["first"]), question("7", &["second"])])
        .await;

    assert_eq!(results[0].selected_answer.as_deref(), Some("first"));
    assert_eq!(results[1].selected_answer.as_deref(), Some("second"));
}

#[tokio::test]
async fn test_invalid_question_fails_alone() {
    let client = Arc::new(MockClient::new());
    let orchestrator = orchestrator(Arc::clone(&client), 2, 5);

    let results = orchestrator
        .process(vec![question("empty", &[]), question("fine", &["x"])])
        .await;

    assert!(results[0].error.is_some());
    assert_eq!(results[0].validation_iterations, 0);
    assert!(results[1].is_success());
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_deadline_cancels_without_dropping_results() {
    let client = Arc::new(MockClient::new().with_delay(Duration::from_millis(300)));
    let orchestrator = orchestrator(Arc::clone(&client), 1, 5);
    let questions: Vec<Question> = ["a", "b", "c"].iter().map(|n| question(n, &["x"])).collect();

    let results = orchestrator
        .process_with_deadline(questions, Duration::from_millis(50))
        .await;

    assert_eq!(numbers(&results), vec!["a", "b", "c"]);
    for result in &results {
        assert!(result.selected_answer.is_none());
        assert!(result.error.as_deref().unwrap().contains("取消"));
    }
    assert_eq!(orchestrator.pool().available_slots(), 1);
}

#[tokio::test]
async fn test_dropped_batch_stops_its_workers() {
    let client = Arc::new(MockClient::new().with_delay(Duration::from_millis(50)));
    let orchestrator = Arc::new(orchestrator(Arc::clone(&client), 1, 5));
    let questions: Vec<Question> = ["a", "b", "c", "d"]
        .iter()
        .map(|n| question(n, &["x"]))
        .collect();

    let batch = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.process(questions).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    batch.abort();
    let _ = batch.await;

    let calls_at_drop = client.calls();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(client.calls(), calls_at_drop);
    assert_eq!(orchestrator.pool().available_slots(), 1);

    // 同一个处理器仍可处理后续批次
    let results = orchestrator.process(vec![question("next", &["x"])]).await;
    assert!(results[0].is_success());
}

#[tokio::test]
async fn test_deadline_keeps_completed_iteration_count() {
    let client = Arc::new(
        MockClient::new()
            .with("slow", Behaviour::AlwaysReject { answer: "x".to_string() })
            .with_delay(Duration::from_millis(30)),
    );
    let orchestrator = orchestrator(Arc::clone(&client), 1, 10);

    let results = orchestrator
        .process_with_deadline(vec![question("slow", &["x", "y"])], Duration::from_millis(100))
        .await;

    let result = &results[0];
    assert!(result.selected_answer.is_none());
    assert!(result.error.as_deref().unwrap().contains("取消"));
    assert!(result.validation_iterations >= 1);
    assert!(result.validation_iterations < 10);
}

#[tokio::test]
async fn test_load_batch_file_and_process() {
    let dir = std::env::temp_dir().join(format!("question_validator_{}", std::process::id()));
    assert_ok!(tokio::fs::create_dir_all(&dir).await);
    let path = dir.join("batch.json");
    let content = r#"[
        {"content":"c1","title":"t1","type":"option","answer":["A","B"],"questionNumber":"1"},
        {"content":"c2","title":"t2","type":"option","answer":["C","D"],"questionNumber":2}
    ]"#;
    assert_ok!(tokio::fs::write(&path, content).await);

    let questions = load_questions_from_file(&path).await.unwrap();
    let results = orchestrator(Arc::new(MockClient::new()), 2, 5)
        .process(questions)
        .await;

    assert_eq!(numbers(&results), vec!["1", "2"]);
    assert_eq!(results[1].selected_answer.as_deref(), Some("C"));

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：LLM_API_KEY=... cargo test -- --ignored
async fn test_answer_batch_live() {
    // 初始化日志
    logging::init("info");

    // 加载配置
    let config = Config::from_env().expect("加载配置失败");

    let client = Arc::new(LlmReasoningClient::new(&config));
    let orchestrator = BatchOrchestrator::from_config(client, &config);

    let questions = load_questions_from_file(Path::new("tests/data/sample_batch.toml"))
        .await
        .expect("加载题目文件失败");
    let total = questions.len();

    let results = orchestrator.process(questions).await;

    assert_eq!(results.len(), total);
    for result in &results {
        println!("{:?}", result);
    }
}
