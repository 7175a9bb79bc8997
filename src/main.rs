use tmplsp::create_service;
use tower_lsp::Server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Stdout carries JSON-RPC, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TMPLSP_LOG").unwrap_or_else(|_| EnvFilter::new("tmplsp=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = create_service();
    Server::new(stdin, stdout, socket).serve(service).await;
}
