use mesh_crypto::CertificateBundle;
use mesh_node::bootstrap::bootstrap_coordinator;

#[test]
fn coordinator_bootstrap_generates_and_reuses_ca() {
    let dir = tempfile::tempdir().unwrap();
    let identity = bootstrap_coordinator(dir.path(), "coordinator.local", "127.0.0.1").unwrap();
    let fingerprint_before = identity.ca.fingerprint().unwrap();

    // second boot against the same certs dir must not regenerate the CA
    let identity_again = bootstrap_coordinator(dir.path(), "coordinator.local", "127.0.0.1").unwrap();
    assert_eq!(fingerprint_before, identity_again.ca.fingerprint().unwrap());

    // the leaf persisted on disk is the same one handed back
    let saved_leaf = CertificateBundle::load_leaf(dir.path()).unwrap();
    assert_eq!(saved_leaf.cert_pem, identity_again.leaf.cert_pem);
}

#[test]
fn coordinator_bootstrap_is_idempotent_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let first = bootstrap_coordinator(dir.path(), "host-a", "10.0.0.1").unwrap();
    let second = bootstrap_coordinator(dir.path(), "host-a", "10.0.0.1").unwrap();
    // a fresh leaf is not re-signed on every boot as long as it's not near expiry
    assert_eq!(first.leaf.cert_pem, second.leaf.cert_pem);
}
