use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("d7modem {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: d7modem");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", env!("D7MODEM_BUILD_TARGET"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "frame: max_payload={} header={}",
        d7modem_frame::MAX_PAYLOAD,
        d7modem_frame::HEADER_SIZE
    );
    println!(
        "defaults: baudrate={} command_timeout={}s",
        d7modem_transport::DEFAULT_BAUDRATE,
        d7modem_driver::DEFAULT_COMMAND_TIMEOUT.as_secs()
    );

    Ok(SUCCESS)
}
