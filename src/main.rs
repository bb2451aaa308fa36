use dnslink_sync_lib::{cli::parse_args, commands::run};

#[tokio::main]
async fn main() {
    let exit_code = run(parse_args()).await;
    std::process::exit(exit_code);
}
