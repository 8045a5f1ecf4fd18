#![forbid(unsafe_code)]

#[tokio::main]
async fn main() {
    vack::init_tracing();
    std::process::exit(vack::run().await);
}
