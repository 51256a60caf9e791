#[tokio::main]
async fn main() {
    let code = lib_polaris::init().await;
    std::process::exit(code);
}
