use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::HttpServer;
use mesh_crypto::CertificateBundle;
use mesh_rpc::{build_app, RpcState};
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};

/// Binds the HTTPS RPC server (spec.md §6: every node speaks HTTPS only,
/// there is no plaintext RPC listener) using the node's own leaf bundle.
/// `with_tls_files` only needs the cert/key on disk long enough for
/// `SslAcceptor` to read them, so the temp files are gone before this
/// function returns.
pub fn bind(bind_address: &str, port: u16, leaf: &CertificateBundle, state: Arc<RpcState>) -> anyhow::Result<Server> {
    let acceptor = leaf.with_tls_files(|cert_path, key_path| {
        let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;
        builder.set_private_key_file(key_path, SslFiletype::PEM)?;
        builder.set_certificate_chain_file(cert_path)?;
        Ok(builder.build())
    })?;

    let server = HttpServer::new(move || build_app(state.clone()))
        .bind_openssl((bind_address, port), acceptor)?
        .shutdown_timeout(5)
        .run();
    Ok(server)
}
