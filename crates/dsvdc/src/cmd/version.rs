use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("dsvdc {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: dsvdc");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", option_env!("DSVDC_BUILD_TARGET").unwrap_or("unknown"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("api_version: {}", dsvdc_host::SUPPORTED_API_VERSION);
    println!(
        "features: host={}, async={}, cli=true",
        cfg!(feature = "host"),
        cfg!(feature = "async")
    );

    Ok(SUCCESS)
}
