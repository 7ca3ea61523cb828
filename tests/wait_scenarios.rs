//! Waiting for approvals while other users grant them concurrently.
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use access_approval::{
    ApprovalError, ApprovalId, ApprovalRequest, ApprovalService, Subject, WaitCoordinator,
    policy::QuorumPolicy, store::InMemoryStore,
};

fn coordinator() -> WaitCoordinator {
    let service = ApprovalService::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(QuorumPolicy::default()),
    );
    // a long poll interval makes sure wake-ups come from the grant signal
    WaitCoordinator::new(Arc::new(service)).set_poll_interval(Duration::from_secs(30))
}

fn request(subject: Subject, approver: &str) -> ApprovalRequest {
    ApprovalRequest::new()
        .set_subject(subject)
        .set_requestor("requestor")
        .set_reason("blah")
        .add_notified_user(approver)
}

#[tokio::test]
async fn wait_returns_immediately_when_already_valid() -> anyhow::Result<()> {
    let waiter = coordinator();
    let service = waiter.service();

    let approval = service.create(request(Subject::client("C.1000000000000000")?, "foo"))?;
    service.grant(&approval.id, "foo")?;

    let result = waiter
        .wait_until_valid(&approval.id, Duration::ZERO)
        .await?;
    assert!(result.is_valid());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_until_client_approval_valid() -> anyhow::Result<()> {
    let waiter = coordinator();
    let service = Arc::clone(waiter.service());

    let approval = service.create(request(Subject::client("C.1000000000000000")?, "foo"))?;
    assert!(!approval.is_valid());

    let id = approval.id.clone();
    let approver = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        service.grant(&id, "foo")
    });

    let result = waiter
        .wait_until_valid(&approval.id, Duration::from_secs(10))
        .await?;
    assert!(result.is_valid());

    approver
        .join()
        .map_err(|_| anyhow::anyhow!("approver thread panicked"))??;
    Ok(())
}

#[tokio::test]
async fn wait_until_hunt_approval_valid() -> anyhow::Result<()> {
    let waiter = coordinator();
    let service = Arc::clone(waiter.service());

    let approval = service.create(request(Subject::hunt("H:0A0B0C0D")?, "approver"))?;

    let id = approval.id.clone();
    let approver = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        service.grant(&id, "approver")
    });

    let result = waiter
        .wait_until_valid(&approval.id, Duration::from_secs(10))
        .await?;
    assert!(result.is_valid());
    assert_eq!(result.approvers().collect::<Vec<_>>(), vec!["approver"]);

    approver.await??;
    Ok(())
}

#[tokio::test]
async fn wait_times_out_without_grant() -> anyhow::Result<()> {
    let waiter = coordinator();
    let service = waiter.service();

    let approval = service.create(request(Subject::client("C.1000000000000000")?, "foo"))?;

    let res = waiter
        .wait_until_valid(&approval.id, Duration::from_millis(100))
        .await;
    assert!(matches!(res, Err(ApprovalError::Timeout { .. })));

    // the record is untouched and the signal released
    assert_eq!(service.get(&approval.id)?, approval);
    assert_eq!(service.signals().watched(), 0);

    Ok(())
}

#[tokio::test]
async fn wait_on_unknown_id_is_not_found() {
    let waiter = coordinator();

    let res = waiter
        .wait_until_valid(&ApprovalId::new("approval1missing"), Duration::from_secs(1))
        .await;
    assert!(matches!(res, Err(ApprovalError::NotFound(_))));
}

#[tokio::test]
async fn grant_that_does_not_satisfy_policy_keeps_waiting() -> anyhow::Result<()> {
    let waiter = coordinator();
    let service = waiter.service();

    let approval = service.create(request(Subject::client("C.1000000000000000")?, "foo"))?;
    // self approval is rejected, so nothing changes
    assert!(service.grant(&approval.id, "requestor").is_err());

    let res = waiter
        .wait_until_valid(&approval.id, Duration::from_millis(100))
        .await;
    assert!(matches!(res, Err(ApprovalError::Timeout { .. })));

    Ok(())
}

#[tokio::test]
async fn cancelled_wait_does_not_disturb_other_waiters() -> anyhow::Result<()> {
    let waiter = Arc::new(coordinator());
    let service = Arc::clone(waiter.service());

    let approval = service.create(request(Subject::client("C.1000000000000000")?, "foo"))?;

    let patient = {
        let waiter = Arc::clone(&waiter);
        let id = approval.id.clone();
        tokio::spawn(async move { waiter.wait_until_valid(&id, Duration::from_secs(10)).await })
    };

    // cancel a second waiter by dropping its future
    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        waiter.wait_until_valid(&approval.id, Duration::from_secs(10)),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(service.get(&approval.id)?, approval);

    service.grant(&approval.id, "foo")?;
    let result = patient.await??;
    assert!(result.is_valid());

    Ok(())
}

#[tokio::test]
async fn polling_sees_grants_from_another_service() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let service = Arc::new(ApprovalService::new(
        store.clone(),
        Arc::new(QuorumPolicy::default()),
    ));
    // shares the records but not the grant signals, like a second process would
    let other = ApprovalService::new(store, Arc::new(QuorumPolicy::default()));
    let waiter = WaitCoordinator::new(service.clone()).set_poll_interval(Duration::from_millis(20));

    let approval = service.create(request(Subject::client("C.1000000000000000")?, "foo"))?;
    let id = approval.id.clone();
    let approver = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        other.grant(&id, "foo")
    });

    let result = waiter
        .wait_until_valid(&approval.id, Duration::from_secs(10))
        .await?;
    assert!(result.is_valid());

    approver.await??;
    Ok(())
}

#[tokio::test]
async fn configured_waiter_uses_default_timeout() -> anyhow::Result<()> {
    let config = access_approval::config::ApprovalConfig::from_yaml_str(
        "default_wait_timeout_secs: 0\nwait_poll_interval_ms: 10\n",
    )?;
    let service = Arc::new(config.build_service()?);
    let waiter = config.build_waiter(Arc::clone(&service));

    let approval = service.create(request(Subject::client("C.1000000000000000")?, "foo"))?;
    let res = waiter.wait_until_valid_default(&approval.id).await;
    assert!(matches!(res, Err(ApprovalError::Timeout { .. })));

    service.grant(&approval.id, "foo")?;
    assert!(waiter.wait_until_valid_default(&approval.id).await?.is_valid());

    Ok(())
}

#[tokio::test]
async fn unbounded_timeout_returns_valid_approval() -> anyhow::Result<()> {
    let waiter = coordinator();
    let service = Arc::clone(waiter.service());

    let approval = service.create(request(Subject::client("C.1000000000000000")?, "foo"))?;
    service.grant(&approval.id, "foo")?;
    let result = waiter.wait_until_valid(&approval.id, Duration::MAX).await?;
    assert!(result.is_valid());

    let pending = service.create(request(Subject::hunt("H:ABC1234")?, "foo"))?;
    let id = pending.id.clone();
    let approver = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.grant(&id, "foo")
    });

    let result = waiter.wait_until_valid(&pending.id, Duration::MAX).await?;
    assert!(result.is_valid());

    approver.await??;
    Ok(())
}
