use log::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 解析命令行参数
    let args = vod_audio::cli::parse_args();

    info!("Starting VOD audio resolver...");
    info!("URL: {}", args.url);

    let run = Box::pin(vod_audio::run(args));
    tokio::select! {
        result = run => {
            if let Err(e) = result {
                error!("An error occurred: {:#}", e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            // 未完成的解析在此之前已被丢弃，浏览器会话随之释放
            error!("Interrupted.");
            std::process::exit(130);
        }
    }

    Ok(())
}
