use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use dsvdc_dsuid::{Dsuid, DsuidKind};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Printable breakdown of a dSUID.
#[derive(Debug, Serialize)]
pub struct DsuidInfo {
    pub dsuid: String,
    pub uuid: String,
    pub version: usize,
    pub kind: &'static str,
}

impl From<Dsuid> for DsuidInfo {
    fn from(dsuid: Dsuid) -> Self {
        Self {
            dsuid: dsuid.to_string(),
            uuid: dsuid.uuid().hyphenated().to_string(),
            version: dsuid.version(),
            kind: kind_name(dsuid.kind()),
        }
    }
}

pub fn kind_name(kind: DsuidKind) -> &'static str {
    match kind {
        DsuidKind::Undefined => "undefined",
        DsuidKind::Sgtin => "sgtin",
        DsuidKind::Uuid => "uuid",
    }
}

pub fn print_dsuids(infos: &[DsuidInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for info in infos {
                println!(
                    "{}",
                    serde_json::to_string(info).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DSUID", "UUID", "VERSION", "KIND"]);
            for info in infos {
                table.add_row(vec![
                    info.dsuid.clone(),
                    info.uuid.clone(),
                    info.version.to_string(),
                    info.kind.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for info in infos {
                println!(
                    "dsuid={} uuid={} version={} kind={}",
                    info.dsuid, info.uuid, info.version, info.kind
                );
            }
        }
    }
}

/// Where a running host can be reached.
#[derive(Debug, Serialize)]
pub struct ListenInfo {
    pub listen: String,
    pub dsuid: String,
    pub name: String,
    pub vdcs: usize,
}

pub fn print_listening(info: &ListenInfo, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(info).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("vDC host:");
            println!("  Listening on: {}", info.listen);
            println!("  dSUID:        {}", info.dsuid);
            println!("  Name:         {}", info.name);
            println!("  vDCs:         {}", info.vdcs);
        }
    }
}

#[cfg(test)]
mod tests {
    use dsvdc_dsuid::DEFAULT_HOST_DSUID;

    use super::*;

    #[test]
    fn dsuid_info_breakdown() {
        let info = DsuidInfo::from(DEFAULT_HOST_DSUID);
        assert_eq!(info.dsuid, "6123A881016010000000F2CA0DEB370700");
        assert_eq!(info.uuid, "6123a881-0160-1000-0000-f2ca0deb3707");
        assert_eq!(info.version, 1);
        assert_eq!(info.kind, "uuid");
    }

    #[test]
    fn dsuid_info_serializes_flat() {
        let value = serde_json::to_value(DsuidInfo::from(DEFAULT_HOST_DSUID)).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["kind"], "uuid");
    }
}
