use sandpit_core::{
    Coordinator, Fault, LimitCause, Sandbox, SandboxConfig, Snapshot, Status, Token, INPUT_BANNER,
};
use std::time::Duration;

async fn wait_for(
    coordinator: &Coordinator,
    token: Token,
    done: impl Fn(&Snapshot) -> bool,
) -> Snapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let snap = coordinator.poll(token).await.unwrap();
        if done(&snap) {
            return snap;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "run never reached the expected state: {snap:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn coordinator_with(config: SandboxConfig) -> Coordinator {
    Coordinator::new(Sandbox::new(config))
}

#[tokio::test]
async fn test_interactive_input_round_trip() {
    let coordinator = Coordinator::default();
    let token = coordinator
        .submit("nom = input('Nom: '); print('Bonjour', nom)")
        .await;

    let waiting = wait_for(&coordinator, token, |s| s.status == Status::WaitingForInput).await;
    assert!(waiting.input_required);
    assert_eq!(waiting.input_prompt, "Nom: ");
    assert!(waiting.output.ends_with("Nom: "));
    assert!(waiting.result.is_none());

    assert!(coordinator.supply_input(token, "Ada").await.unwrap());

    let done = wait_for(&coordinator, token, |s| s.status.is_terminal()).await;
    assert_eq!(done.status, Status::Completed);
    let result = done.result.unwrap();
    assert_eq!(result.error, "");
    assert_eq!(result.output, format!("{INPUT_BANNER}Nom: Ada\nBonjour Ada\n"));
}

#[tokio::test]
async fn test_several_prompts_in_sequence() {
    let coordinator = Coordinator::default();
    let token = coordinator
        .submit("a = int(input('a? '))\nb = int(input('b? '))\nprint(a + b)\n")
        .await;

    for (prompt, value) in [("a? ", "2"), ("b? ", "40")] {
        let snap = wait_for(&coordinator, token, |s| {
            s.status == Status::WaitingForInput && s.input_prompt == prompt
        })
        .await;
        assert!(snap.input_required);
        assert!(coordinator.supply_input(token, value).await.unwrap());
    }

    let done = wait_for(&coordinator, token, |s| s.status.is_terminal()).await;
    assert!(done.result.unwrap().output.ends_with("a? 2\nb? 40\n42\n"));
}

#[tokio::test]
async fn test_supply_input_rejected_while_running() {
    // the loop outlives the poll below; the wall clock ends it
    let coordinator = coordinator_with(
        SandboxConfig::interactive()
            .with_timeout(Duration::from_secs(2))
            .with_max_instructions(1_000_000_000_000),
    );
    let token = coordinator
        .submit("n = 10 ** 9\ntotal = 0\nfor i in range(n):\n    total += i\n")
        .await;

    wait_for(&coordinator, token, |s| s.status == Status::Running).await;
    assert!(!coordinator.supply_input(token, "ignored").await.unwrap());
    let after = coordinator.poll(token).await.unwrap();
    assert_eq!(after.status, Status::Running);
    assert!(!after.input_required);
    assert_eq!(after.input_prompt, "");

    let done = wait_for(&coordinator, token, |s| s.status.is_terminal()).await;
    assert_eq!(done.status, Status::Error);
    assert!(matches!(
        done.result.unwrap().fault,
        Some(Fault::ResourceExceeded(LimitCause::WallClockTimeout(_)))
    ));
    assert!(!coordinator.supply_input(token, "late").await.unwrap());
}

#[tokio::test]
async fn test_unanswered_input_times_out() {
    let coordinator = coordinator_with(
        SandboxConfig::interactive().with_input_wait(Duration::from_millis(100)),
    );
    let token = coordinator.submit("x = input('? ')\nprint('never')\n").await;

    let done = wait_for(&coordinator, token, |s| s.status.is_terminal()).await;
    assert_eq!(done.status, Status::Error);
    let result = done.result.unwrap();
    assert!(!result.output.contains("never"));
    assert!(matches!(
        result.fault,
        Some(Fault::ResourceExceeded(LimitCause::InputTimeout(_)))
    ));
    assert_eq!(
        result.error,
        LimitCause::InputTimeout(Duration::from_millis(100)).to_string()
    );
}

#[tokio::test]
async fn test_input_wait_does_not_count_against_timeout() {
    let coordinator = coordinator_with(
        SandboxConfig::interactive().with_timeout(Duration::from_millis(300)),
    );
    let token = coordinator.submit("x = input('? ')\nprint(x * 2)\n").await;

    wait_for(&coordinator, token, |s| s.status == Status::WaitingForInput).await;
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(
        coordinator.poll(token).await.unwrap().status,
        Status::WaitingForInput
    );
    assert!(coordinator.supply_input(token, "ab").await.unwrap());

    let done = wait_for(&coordinator, token, |s| s.status.is_terminal()).await;
    assert_eq!(done.status, Status::Completed);
    assert!(done.result.unwrap().output.ends_with("? ab\nabab\n"));
}

#[tokio::test]
async fn test_concurrent_runs_do_not_mix_output() {
    let coordinator = Coordinator::default();
    let mut tokens = Vec::new();
    for tag in ["red", "blue", "green"] {
        let source = format!("for i in range(300):\n    print('{tag}')\n");
        tokens.push((tag, coordinator.submit(source).await));
    }
    for (tag, token) in tokens {
        let done = wait_for(&coordinator, token, |s| s.status.is_terminal()).await;
        let output = done.result.unwrap().output;
        assert_eq!(output.lines().count(), 300);
        assert!(output.lines().all(|line| line == tag));
    }
}

#[tokio::test]
async fn test_limit_faults_surface_as_error_status() {
    let coordinator =
        coordinator_with(SandboxConfig::interactive().with_max_instructions(200));
    let token = coordinator
        .submit("def f(n):\n    return f(n + 1)\nf(0)\n")
        .await;
    let done = wait_for(&coordinator, token, |s| s.status.is_terminal()).await;
    assert_eq!(done.status, Status::Error);
    assert_eq!(
        done.result.unwrap().error,
        Fault::from(LimitCause::InstructionBudget(200)).to_string()
    );
}

#[tokio::test]
async fn test_sweeper_retires_records() {
    let coordinator = Coordinator::default();
    let token = coordinator.submit("print('bye')").await;
    wait_for(&coordinator, token, |s| s.status.is_terminal()).await;

    let sweeper = coordinator
        .spawn_sweeper(Duration::from_millis(20), Duration::ZERO)
        .unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while coordinator.poll(token).await.is_ok() {
        assert!(tokio::time::Instant::now() < deadline, "record never swept");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sweeper.abort();
}

#[tokio::test]
async fn test_snapshot_json_shape() {
    let coordinator = Coordinator::default();
    let token = coordinator.submit("print('ok')").await;
    let done = wait_for(&coordinator, token, |s| s.status.is_terminal()).await;
    let json = serde_json::to_value(&done).unwrap();
    assert_eq!(json["status"], "completed");
    assert_eq!(json["input_required"], false);
    assert_eq!(json["result"]["output"], "ok\n");
    assert_eq!(json["result"]["error"], "");
    assert_eq!(json["token"], token.to_string());
}
