use sandpit_core::{Fault, LimitCause, Sandbox, SandboxConfig};
use std::time::{Duration, Instant};

fn generous() -> SandboxConfig {
    SandboxConfig::default().with_timeout(Duration::from_secs(3600))
}

#[tokio::test]
async fn test_clean_run_returns_printed_text() {
    let src = "\
import math
from statistics import mean
import json

scores = {'ada': [18, 15], 'alan': [12, 14, 19]}
for name, marks in scores.items():
    print(f'{name}: {mean(marks):.1f}')
print(math.floor(math.sqrt(50)))
print(json.dumps({'n': len(scores)}))
";
    let result = Sandbox::default().run(src).await;
    assert_eq!(result.error, "");
    assert_eq!(result.output, "ada: 16.5\nalan: 15.0\n7\n{\"n\": 2}\n");
}

#[tokio::test]
async fn test_forbidden_import_never_runs() {
    let src = "print('sentinel')\nimport socket\nprint('after')\n";
    let result = Sandbox::default().run(src).await;
    assert_eq!(result.output, "");
    assert!(!result.output.contains("sentinel"));
    assert!(matches!(result.fault, Some(Fault::AnalysisRejected(_))));
    assert!(result.error.starts_with("Issues detected in code:\n- "));
    assert!(result.error.contains("socket"));
}

#[tokio::test]
async fn test_while_true_rejected_instantly() {
    let started = Instant::now();
    let result = Sandbox::new(generous()).run("while True:\n    pass\n").await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        result.error,
        "Issues detected in code:\n- 'while True' loop without a 'break' statement (line 1)"
    );
}

#[tokio::test]
async fn test_large_literal_range_rejected() {
    let result = Sandbox::new(generous())
        .run("for i in range(100000000):\n    pass\n")
        .await;
    assert!(matches!(result.fault, Some(Fault::AnalysisRejected(ref issues)) if issues.len() == 1));
    assert!(result.error.contains("100000000"));
}

#[tokio::test]
async fn test_unbounded_recursion_hits_instruction_budget() {
    let config = generous()
        .with_max_instructions(2_000)
        .with_max_recursion_depth(100_000);
    let result = Sandbox::new(config)
        .run("def dive(n):\n    return dive(n + 1)\ndive(0)\n")
        .await;
    assert_eq!(
        result.fault,
        Some(Fault::ResourceExceeded(LimitCause::InstructionBudget(2_000)))
    );
    assert_eq!(
        result.error,
        "The code executed more than 2000 instructions. \
         This is probably an infinite loop or very inefficient code."
    );
}

#[tokio::test]
async fn test_deeply_nested_source_is_rejected() {
    let src = format!("x = {}1{}\n", "(".repeat(1000), ")".repeat(1000));
    let result = Sandbox::new(generous()).run(&src).await;
    assert!(matches!(result.fault, Some(Fault::AnalysisRejected(_))));
    assert!(result.error.contains("too many nested parentheses"));

    let src = format!("x = {}1\n", "-".repeat(200_000));
    let result = Sandbox::new(generous()).run(&src).await;
    assert!(matches!(result.fault, Some(Fault::AnalysisRejected(_))));
}

#[tokio::test]
async fn test_temporaries_count_toward_memory_ceiling() {
    let config = generous()
        .with_max_memory_mb(100)
        .with_max_instructions(u64::MAX);
    let result = Sandbox::new(config)
        .run("x = len(['a' * 10000 + str(i) for i in range(100000)])\n")
        .await;
    assert!(matches!(
        result.fault,
        Some(Fault::ResourceExceeded(LimitCause::Memory(_)))
    ));
}

#[tokio::test]
async fn test_denied_builtins_are_absent() {
    let result = Sandbox::default().run("f = open\n").await;
    assert!(result.error.ends_with("NameError: name 'open' is not defined"));
}

#[tokio::test]
async fn test_environment_is_fresh_per_run() {
    let sandbox = Sandbox::default();
    let first = sandbox.run("counter = 41\nprint(counter + 1)\n").await;
    assert_eq!(first.output, "42\n");
    let second = sandbox.run("print(counter)\n").await;
    assert!(second.error.ends_with("NameError: name 'counter' is not defined"));
}
