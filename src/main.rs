#[tokio::main]
async fn main() {
    if let Err(e) = rag_desk_lib::run().await {
        eprintln!("rag-desk: {}", e);
        std::process::exit(1);
    }
}
