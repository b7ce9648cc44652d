use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("duinobus {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: duinobus");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "build_target: {}",
        option_env!("DUINOBUS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("DUINOBUS_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!(
        "features: bus={}, async={}, cli=true",
        cfg!(feature = "bus"),
        cfg!(feature = "async")
    );
    println!("max_payload: {}", duinobus_frame::MAX_PAYLOAD);

    Ok(SUCCESS)
}
