use std::sync::Arc;
use std::time::Duration;

use procvisor::{
    Command, ExitCategory, ExitRegistry, ManagerConfig, ProcessError, ProcessManager, ProcessSpec,
    ProcessState, Signal, TimeoutSpec, exit::code,
};

fn manager() -> Arc<ProcessManager> {
    ProcessManager::builder(ManagerConfig::default())
        .with_registry(ExitRegistry::new())
        .build()
}

async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exit_zero_succeeds() {
    let mgr = manager();
    let result = mgr.run(ProcessSpec::new(Command::argv(["true"]))).await.unwrap();

    assert_eq!(result.exit_code(), code::SUCCESS);
    assert!(result.succeeded());
    assert_eq!(result.classified().category, ExitCategory::Success);
    assert_eq!(mgr.registry().tracked(), 0);
    assert_eq!(mgr.registry().pending(), 0);
    assert_eq!(mgr.registry().unclaimed(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_general_error_carries_output() {
    let mgr = manager();
    let spec = ProcessSpec::new("echo out; echo err >&2; exit 1");
    let err = mgr.run(spec).await.unwrap_err();

    let ProcessError::CommandFailed { category, result } = &err else {
        panic!("unexpected: {err:?}");
    };
    assert_eq!(*category, ExitCategory::GeneralError);
    assert_eq!(result.stdout().unwrap(), b"out\n");
    assert_eq!(result.stderr().unwrap(), b"err\n");
    assert_eq!(err.exit_code(), Some(code::GENERAL_ERROR));
    assert!(err.as_message().contains("out"));
    assert!(err.as_message().contains("err"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_accepted_codes_override_default() {
    let mgr = manager();
    let spec = ProcessSpec::new("exit 3").with_accepted_codes([0, 3]);
    let result = mgr.run(spec).await.unwrap();
    assert_eq!(result.exit_code(), 3);
    assert!(result.succeeded());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_wrapper_fires() {
    let mgr = manager();
    let spec =
        ProcessSpec::new(Command::argv(["sleep", "1"])).with_timeout(TimeoutSpec::new(0.01));
    let handle = mgr.spawn(spec).unwrap();
    assert_eq!(
        handle.command(),
        &Command::argv(["timeout", "0.010s", "sleep", "1"])
    );

    let err = handle.wait().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.exit_code(), Some(code::TIMED_OUT));
    assert!(err.result().unwrap().timed_out());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_negative_timeout_is_a_wrapper_failure() {
    let mgr = manager();
    let spec =
        ProcessSpec::new(Command::argv(["sleep", "1"])).with_timeout(TimeoutSpec::new(-1.0));
    let err = mgr.run(spec).await.unwrap_err();

    assert_eq!(err.exit_code(), Some(code::TIMEOUT_COMMAND_FAILED));
    assert!(matches!(
        err,
        ProcessError::CommandFailed {
            category: ExitCategory::TimeoutInvocationFailed,
            ..
        }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_kill_reports_128_plus_signal() {
    let mgr = manager();
    let spec = ProcessSpec::new(Command::argv(["sleep", "5"])).with_accepted_codes([code::SIGKILL]);
    let handle = mgr.spawn(spec).unwrap();

    assert!(handle.kill());
    let result = handle.wait().await.unwrap();
    assert_eq!(result.exit_code(), code::SIGKILL);
    assert_eq!(
        result.classified().category,
        ExitCategory::Signaled(Signal::SIGKILL as i32)
    );

    assert!(!handle.kill());
    assert!(!handle.signal(Signal::SIGTERM));
    assert_eq!(handle.state(), ProcessState::Released);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_segfault_reports_139() {
    let mgr = manager();
    let spec = ProcessSpec::new("kill -SEGV $$").with_accepted_codes([code::SIGSEGV]);
    let result = mgr.run(spec).await.unwrap();
    assert_eq!(result.exit_code(), code::SIGSEGV);
    assert_eq!(
        result.classified().category.description(),
        "Terminated by SIGSEGV (11)."
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_and_continue_are_not_exit() {
    let mgr = manager();
    let spec = ProcessSpec::new(Command::argv(["sleep", "5"])).with_accepted_codes([code::SIGKILL]);
    let handle = mgr.spawn(spec).unwrap();

    assert!(handle.signal(Signal::SIGSTOP));
    assert!(eventually(|| handle.is_stopped()).await);
    assert!(!handle.is_done());
    assert_eq!(mgr.registry().tracked(), 1);

    assert!(handle.signal(Signal::SIGCONT));
    assert!(eventually(|| handle.is_running()).await);

    assert!(handle.kill());
    assert_eq!(handle.wait().await.unwrap().exit_code(), code::SIGKILL);
    assert_eq!(mgr.registry().tracked(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_continued_child_finishes_normally() {
    let mgr = manager();
    let handle = mgr
        .spawn(ProcessSpec::new(Command::argv(["sleep", "0.3"])))
        .unwrap();

    assert!(handle.signal(Signal::SIGSTOP));
    assert!(eventually(|| handle.is_stopped()).await);
    assert!(handle.signal(Signal::SIGCONT));

    let result = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.exit_code(), code::SUCCESS);
    assert_eq!(handle.state(), ProcessState::Released);
    assert_eq!(mgr.registry().tracked(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_terminate_kills_stopped_child() {
    let mgr = manager();
    let spec = ProcessSpec::new(Command::argv(["sleep", "30"])).with_accepted_codes([code::SIGKILL]);
    let handle = mgr.spawn(spec).unwrap();

    assert!(handle.signal(Signal::SIGSTOP));
    assert!(eventually(|| handle.is_stopped()).await);

    assert!(handle.terminate(Some(Duration::from_millis(100))).await.unwrap());
    let result = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.exit_code(), code::SIGKILL);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_terminate_is_idempotent() {
    let mgr = manager();
    let spec = ProcessSpec::new(Command::argv(["sleep", "5"])).with_accepted_codes([code::SIGTERM]);
    let handle = mgr.spawn(spec).unwrap();

    assert!(handle.terminate(None).await.unwrap());
    assert_eq!(handle.wait().await.unwrap().exit_code(), code::SIGTERM);

    assert!(!handle.terminate(None).await.unwrap());
    assert!(!handle.terminate(Some(Duration::from_millis(10))).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_terminate_escalates_to_kill() {
    let mgr = manager();
    let spec = ProcessSpec::new("trap '' TERM; exec sleep 5").with_accepted_codes([code::SIGKILL]);
    let handle = mgr.spawn(spec).unwrap();
    // Give the shell time to install the trap before signalling.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(handle.terminate(Some(Duration::from_millis(100))).await.unwrap());
    assert_eq!(handle.wait().await.unwrap().exit_code(), code::SIGKILL);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_terminate_surfaces_failure() {
    let mgr = manager();
    let handle = mgr.spawn(ProcessSpec::new(Command::argv(["sleep", "5"]))).unwrap();

    let outcome = handle.terminate(Some(Duration::from_millis(200))).await;
    match outcome {
        Err(ProcessError::CommandFailed { category, .. }) => {
            assert_eq!(category, ExitCategory::Signaled(Signal::SIGTERM as i32));
        }
        // The exit may land after the grace check; wait() reports it then.
        Ok(true) => assert!(handle.wait().await.is_err()),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_spawn_failure_creates_no_handle() {
    let mgr = manager();
    let err = mgr
        .spawn(ProcessSpec::new(Command::argv(["/nonexistent/procvisor-binary"])))
        .unwrap_err();
    assert!(matches!(err, ProcessError::Spawn { .. }));
    assert_eq!(err.as_label(), "process_spawn_failed");
    assert_eq!(mgr.registry().tracked(), 0);

    let err = mgr.spawn(ProcessSpec::new(Command::Argv(Vec::new()))).unwrap_err();
    assert!(matches!(err, ProcessError::Spawn { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_environment_is_replaced() {
    let mgr = manager();
    let spec = ProcessSpec::new(Command::argv([
        "/bin/sh",
        "-c",
        "echo \"$PROCVISOR_TEST:${HOME:-unset}\"",
    ]))
    .with_envs([("PROCVISOR_TEST", "set")]);
    let result = mgr.run(spec).await.unwrap();
    assert_eq!(result.stdout().unwrap(), b"set:unset\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_working_directory() {
    let mgr = manager();
    let dir = tempfile::tempdir().unwrap();
    let spec = ProcessSpec::new(Command::argv(["pwd", "-P"])).with_working_dir(dir.path());
    let result = mgr.run(spec).await.unwrap();

    let stdout = String::from_utf8(result.stdout().unwrap()).unwrap();
    assert_eq!(
        std::path::Path::new(stdout.trim_end()),
        dir.path().canonicalize().unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_global_registry_is_default() {
    let mgr = ProcessManager::new(ManagerConfig::default());
    assert!(Arc::ptr_eq(mgr.registry(), &ExitRegistry::global()));
    let result = mgr.run(ProcessSpec::new("exit 0")).await.unwrap();
    assert_eq!(result.exit_code(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_handle_is_killed_and_reaped() {
    let mgr = manager();
    let mut rx = mgr.subscribe();
    let handle = mgr.spawn(ProcessSpec::new(Command::argv(["sleep", "5"]))).unwrap();
    let pid = handle.pid();
    drop(handle);

    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == procvisor::EventKind::ProcessFinished && ev.pid == Some(pid) {
                return ev;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(finished.exit_code, Some(code::SIGKILL));
    assert!(eventually(|| mgr.registry().tracked() == 0).await);
}
