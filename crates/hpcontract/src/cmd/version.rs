use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("hpcontract {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    println!(
        "target: {}",
        option_env!("HPCONTRACT_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "max_message_size: {}",
        hpcontract_channel::MAX_MESSAGE_SIZE
    );
    println!(
        "protocols: {}, {}",
        hpcontract_runtime::ClientProtocol::Json,
        hpcontract_runtime::ClientProtocol::Bson
    );

    Ok(SUCCESS)
}
