//! Multiplexer setup/teardown tests against the in-memory datapath and links.
//!
//! Run with:
//!   cargo test --package l3mp --test multiplexer_test --features test-util

use l3mp::test_util::{EXTERNAL_MTU, FakeDatapath, FakeLinks, test_config};
use l3mp::{Datapath, Error, Label, Multiplexer};
use tokio::sync::watch;

fn label(v: i64) -> Label {
    Label::new(v).unwrap()
}

/// eth0 with mp1@1 and mp2@2: both devices exist with the external MTU, the
/// routing table maps each label to its device and eth0 carries exactly one
/// ingress classifier.
#[tokio::test]
async fn test_setup_two_interfaces() {
    let links = FakeLinks::new();
    let eth0 = links.add_existing("eth0", EXTERNAL_MTU);
    let datapath = FakeDatapath::new();
    let kernel = datapath.kernel();

    let config = test_config("eth0", &[("mp1", 1), ("mp2", 2)]);
    let mut mux = Multiplexer::new(datapath, links.clone());
    mux.setup(&config).await.expect("setup should succeed");

    let mp1 = links.get("mp1").expect("mp1 should exist");
    let mp2 = links.get("mp2").expect("mp2 should exist");
    assert_eq!(mp1.mtu, 1500);
    assert_eq!(mp2.mtu, 1500);

    {
        let k = kernel.lock().unwrap();
        assert_eq!(k.destinations.len(), 2);
        assert_eq!(k.destinations[&1], mp1.index);
        assert_eq!(k.destinations[&2], mp2.index);

        let root = &k.roots[&eth0.index];
        assert_eq!(root.filter_count(), 1);
        assert_eq!(root.ingress, Some("ingress"));
        assert_eq!(k.roots[&mp1.index].egress, Some("egress"));
        assert_eq!(k.roots[&mp2.index].egress, Some("egress"));
    }

    let dp = mux.loader().datapath();
    assert_eq!(dp.destination(label(1)).unwrap(), Some(mp1.index));
    assert_eq!(
        dp.egress_settings(mp2.index).unwrap().map(|s| s.external_ifindex),
        Some(eth0.index)
    );
    assert_eq!(mux.managed().len(), 2);

    let errors = mux.shutdown().await;
    assert!(errors.is_empty(), "unexpected teardown errors: {errors:?}");
}

/// Managed devices inherit whatever MTU the external interface has.
#[tokio::test]
async fn test_managed_mtu_follows_external() {
    let links = FakeLinks::new();
    links.add_existing("eth0", 9000);

    let config = test_config("eth0", &[("mp1", 0)]);
    let mut mux = Multiplexer::new(FakeDatapath::new(), links.clone());
    mux.setup(&config).await.unwrap();

    assert_eq!(links.get("mp1").unwrap().mtu, 9000);
    mux.shutdown().await;
}

/// Signalling shutdown tears down everything in reverse creation order.
#[tokio::test]
async fn test_run_until_shutdown() {
    let links = FakeLinks::new();
    let eth0 = links.add_existing("eth0", EXTERNAL_MTU);
    let datapath = FakeDatapath::new();
    let kernel = datapath.kernel();

    let config = test_config("eth0", &[("mp1", 1), ("mp2", 2)]);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = shutdown_tx.send(true);
    });

    Multiplexer::new(datapath, links.clone())
        .run(&config, shutdown_rx)
        .await
        .expect("run should succeed");

    let state = links.state();
    let s = state.lock().unwrap();
    assert_eq!(s.created, vec!["mp1", "mp2"]);
    assert_eq!(s.destroyed, vec!["mp2", "mp1"]);
    assert_eq!(s.links.keys().collect::<Vec<_>>(), vec!["eth0"]);

    let k = kernel.lock().unwrap();
    assert!(k.roots.is_empty());
    assert!(!k.roots.contains_key(&eth0.index));
    assert!(k.destinations.is_empty());
    assert!(k.egress_settings.is_empty());
    assert!(k.released);
}

/// A missing external interface fails before anything is created.
#[tokio::test]
async fn test_missing_external() {
    let links = FakeLinks::new();
    let datapath = FakeDatapath::new();
    let kernel = datapath.kernel();

    let config = test_config("eth0", &[("mp1", 1)]);
    let result = Multiplexer::new(datapath, links.clone())
        .run(&config, watch::channel(false).1)
        .await;

    assert!(matches!(result, Err(Error::NotFound(ref name)) if name == "eth0"));
    assert!(links.state().lock().unwrap().created.is_empty());
    let k = kernel.lock().unwrap();
    assert_eq!(k.mutations, 0);
    assert!(k.released);
}

/// A device creation failure halfway through rolls back the earlier devices.
#[tokio::test]
async fn test_creation_failure_rolls_back() {
    let links = FakeLinks::new();
    links.add_existing("eth0", EXTERNAL_MTU);
    links.state().lock().unwrap().fail_create = Some("mp2".to_string());
    let datapath = FakeDatapath::new();
    let kernel = datapath.kernel();

    let config = test_config("eth0", &[("mp1", 1), ("mp2", 2)]);
    let result = Multiplexer::new(datapath, links.clone())
        .run(&config, watch::channel(false).1)
        .await;

    assert!(matches!(result, Err(Error::CreationFailed { ref name, .. }) if name == "mp2"));

    let state = links.state();
    let s = state.lock().unwrap();
    assert_eq!(s.destroyed, vec!["mp1"]);
    assert!(!s.links.contains_key("mp1"));

    let k = kernel.lock().unwrap();
    assert!(k.roots.is_empty());
    assert!(k.destinations.is_empty());
}

/// A device that already exists is not taken over or deleted.
#[tokio::test]
async fn test_existing_device_not_touched() {
    let links = FakeLinks::new();
    links.add_existing("eth0", EXTERNAL_MTU);
    links.add_existing("mp1", 1400);

    let config = test_config("eth0", &[("mp1", 1)]);
    let result = Multiplexer::new(FakeDatapath::new(), links.clone())
        .run(&config, watch::channel(false).1)
        .await;

    assert!(matches!(result, Err(Error::CreationFailed { .. })));
    assert_eq!(links.get("mp1").map(|i| i.mtu), Some(1400));
    assert!(links.state().lock().unwrap().destroyed.is_empty());
}

/// A classifier failure on a managed device removes that device too.
#[tokio::test]
async fn test_attach_failure_rolls_back() {
    let links = FakeLinks::new();
    links.add_existing("eth0", EXTERNAL_MTU);
    let datapath = FakeDatapath::new();
    let kernel = datapath.kernel();
    kernel.lock().unwrap().fail_attach = Some("mp2".to_string());

    let config = test_config("eth0", &[("mp1", 1), ("mp2", 2)]);
    let result = Multiplexer::new(datapath, links.clone())
        .run(&config, watch::channel(false).1)
        .await;

    assert!(matches!(result, Err(Error::AttachFailed { .. })));

    let state = links.state();
    let s = state.lock().unwrap();
    assert_eq!(s.destroyed, vec!["mp2", "mp1"]);
    assert_eq!(s.links.keys().collect::<Vec<_>>(), vec!["eth0"]);

    let k = kernel.lock().unwrap();
    assert!(k.roots.is_empty());
    assert!(k.destinations.is_empty());
    assert!(k.egress_settings.is_empty());
}

/// The configured label ceiling reaches the loader.
#[tokio::test]
async fn test_config_max_label_enforced() {
    let links = FakeLinks::new();
    links.add_existing("eth0", EXTERNAL_MTU);

    let mut config = test_config("eth0", &[("mp1", 1), ("mp2", 2)]);
    config.max_label = 1;

    let result = Multiplexer::new(FakeDatapath::new(), links.clone())
        .run(&config, watch::channel(false).1)
        .await;

    assert!(matches!(result, Err(Error::InvalidLabel(2))));
    assert_eq!(links.state().lock().unwrap().destroyed, vec!["mp2", "mp1"]);
}
