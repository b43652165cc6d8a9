#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let outcome = crmbrief_lib::run().await;
    std::process::exit(outcome.exit_code());
}
