use dsvdc_dsuid::{Dsuid, DsuidGenerator};

use crate::cmd::{Algorithm, GenerateArgs, ParseArgs};
use crate::exit::{dsuid_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_dsuids, DsuidInfo, OutputFormat};

pub fn generate(args: GenerateArgs, format: OutputFormat) -> CliResult<i32> {
    let dsuids = generate_all(&args)?;
    let infos: Vec<DsuidInfo> = dsuids.into_iter().map(DsuidInfo::from).collect();
    print_dsuids(&infos, format);
    Ok(SUCCESS)
}

pub fn parse(args: ParseArgs, format: OutputFormat) -> CliResult<i32> {
    let dsuid = Dsuid::parse(&args.dsuid).map_err(|err| dsuid_error("parse failed", err))?;
    print_dsuids(&[DsuidInfo::from(dsuid)], format);
    Ok(SUCCESS)
}

fn generate_all(args: &GenerateArgs) -> CliResult<Vec<Dsuid>> {
    if args.count == 0 {
        return Err(CliError::new(USAGE, "count must be greater than zero"));
    }

    match args.algorithm {
        Algorithm::V1 => {
            let generator = DsuidGenerator::new();
            Ok((0..args.count).map(|_| generator.generate_v1()).collect())
        }
        Algorithm::V4 => Ok((0..args.count).map(|_| Dsuid::generate_v4()).collect()),
        Algorithm::V3 | Algorithm::V5 => {
            let (Some(namespace), Some(name)) = (args.namespace, args.name.as_deref()) else {
                return Err(CliError::new(
                    USAGE,
                    "v3 and v5 need --namespace and --name",
                ));
            };
            let dsuid = if args.algorithm == Algorithm::V3 {
                Dsuid::generate_v3(namespace, name)
            } else {
                Dsuid::generate_v5(namespace, name)
            };
            // Name-based ids are deterministic, count is ignored.
            Ok(vec![dsuid])
        }
    }
}
