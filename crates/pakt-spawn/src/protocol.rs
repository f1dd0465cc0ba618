//! The tab-delimited helper line protocol.
//!
//! One record per line, dispatch on the first column. Fields that carry
//! free text have `\ \f \r \t` squashed to spaces; multi-line text
//! travels with `;` standing in for newlines; error text additionally
//! swaps `%` for `$` so nothing downstream treats it as a format
//! string.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use pakt_types::{
    Category, Details, DistroUpgrade, DistroUpgradeState, Files, Group, Info, MediaType,
    PackageId, PkError, RepoDetail, RepoSignature, Restart, SigType, Status, UpdateDetail,
    UpdateState,
};

use crate::error::ProtocolError;

/// One parsed helper record.
#[derive(Debug, Clone, PartialEq)]
pub enum HelperMessage {
    Package {
        info: Info,
        package_id: PackageId,
        summary: String,
    },
    Details(Details),
    Finished,
    Files(Files),
    RepoDetail(RepoDetail),
    UpdateDetail(Box<UpdateDetail>),
    Percentage(u32),
    ItemProgress {
        package_id: PackageId,
        status: Status,
        percentage: u32,
    },
    ErrorCode {
        code: PkError,
        details: String,
    },
    RequireRestart {
        restart: Restart,
        package_id: PackageId,
    },
    Status(Status),
    Speed(u64),
    DownloadSizeRemaining(u64),
    AllowCancel(bool),
    NoPercentageUpdates,
    RepoSignatureRequired(Box<RepoSignature>),
    EulaRequired {
        eula_id: String,
        package_id: PackageId,
        vendor: String,
        license_agreement: String,
    },
    MediaChangeRequired {
        media_type: MediaType,
        media_id: String,
        media_text: String,
    },
    DistroUpgrade(DistroUpgrade),
    Category(Category),
}

/// Squash semantic delimiters that would corrupt one-line records.
fn squash_delimiters(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\\' | '\u{c}' | '\r' | '\t' => ' ',
            other => other,
        })
        .collect()
}

/// `;` stands in for newlines in multi-line fields.
fn restore_newlines(text: &str) -> String {
    text.replace(';', "\n")
}

fn field_count(command: &str, fields: &[&str], expected: usize) -> Result<(), ProtocolError> {
    if fields.len() != expected {
        return Err(ProtocolError::FieldCount {
            command: command.to_string(),
            got: fields.len(),
        });
    }
    Ok(())
}

fn parse_package_id(text: &str) -> Result<PackageId, ProtocolError> {
    PackageId::from_str(text).map_err(|_| ProtocolError::InvalidPackageId(text.to_string()))
}

fn parse_percentage(text: &str) -> Result<u32, ProtocolError> {
    let value: i64 = text
        .parse()
        .map_err(|_| ProtocolError::InvalidPercentage(text.to_string()))?;
    if !(0..=100).contains(&value) {
        return Err(ProtocolError::InvalidPercentage(text.to_string()));
    }
    Ok(value as u32)
}

fn parse_u64(field: &'static str, text: &str) -> Result<u64, ProtocolError> {
    text.parse().map_err(|_| ProtocolError::InvalidNumber {
        field,
        value: text.to_string(),
    })
}

fn parse_bool(text: &str) -> Result<bool, ProtocolError> {
    match text {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ProtocolError::InvalidBoolean(other.to_string())),
    }
}

fn nonblank(field: &'static str, text: &str) -> Result<(), ProtocolError> {
    if text.is_empty() {
        return Err(ProtocolError::BlankField(field));
    }
    Ok(())
}

fn split_list(text: &str, separator: char) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split(separator).map(str::to_string).collect()
}

fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Parses one stdout line into a typed record.
pub fn parse_line(line: &str) -> Result<HelperMessage, ProtocolError> {
    let fields: Vec<&str> = line.split('\t').collect();
    let command = fields[0];

    match command {
        "package" => {
            field_count(command, &fields, 4)?;
            let info = Info::from_text(fields[1]);
            if info == Info::Unknown {
                return Err(ProtocolError::UnknownEnum {
                    kind: "Info",
                    value: fields[1].to_string(),
                });
            }
            let package_id = parse_package_id(fields[2])?;
            Ok(HelperMessage::Package {
                info,
                package_id,
                summary: squash_delimiters(fields[3]),
            })
        }
        "details" => {
            field_count(command, &fields, 8)?;
            let package_id = parse_package_id(fields[1])?;
            let size = parse_u64("size", fields[7])?;
            if size > 1073741824 {
                return Err(ProtocolError::PackageSizeTooLarge);
            }
            Ok(HelperMessage::Details(Details {
                package_id,
                summary: squash_delimiters(fields[2]),
                license: fields[3].to_string(),
                group: Group::from_text(fields[4]),
                description: restore_newlines(&squash_delimiters(fields[5])),
                url: fields[6].to_string(),
                size,
            }))
        }
        "finished" => {
            field_count(command, &fields, 1)?;
            Ok(HelperMessage::Finished)
        }
        "files" => {
            field_count(command, &fields, 3)?;
            let package_id = parse_package_id(fields[1])?;
            Ok(HelperMessage::Files(Files {
                package_id,
                files: split_list(fields[2], ';'),
            }))
        }
        "repo-detail" => {
            field_count(command, &fields, 4)?;
            Ok(HelperMessage::RepoDetail(RepoDetail {
                repo_id: fields[1].to_string(),
                description: squash_delimiters(fields[2]),
                enabled: parse_bool(fields[3])?,
            }))
        }
        "updatedetail" => {
            field_count(command, &fields, 13)?;
            let package_id = parse_package_id(fields[1])?;
            let restart = Restart::from_text(fields[7]);
            if restart == Restart::Unknown {
                return Err(ProtocolError::UnknownEnum {
                    kind: "Restart",
                    value: fields[7].to_string(),
                });
            }
            Ok(HelperMessage::UpdateDetail(Box::new(UpdateDetail {
                package_id: Some(package_id),
                updates: split_list(fields[2], '&'),
                obsoletes: split_list(fields[3], '&'),
                vendor_urls: split_list(fields[4], ';'),
                bugzilla_urls: split_list(fields[5], ';'),
                cve_urls: split_list(fields[6], ';'),
                restart,
                update_text: restore_newlines(fields[8]),
                changelog: restore_newlines(fields[9]),
                state: UpdateState::from_text(fields[10]),
                issued: parse_time(fields[11]),
                updated: parse_time(&squash_delimiters(fields[12])),
            })))
        }
        "percentage" => {
            field_count(command, &fields, 2)?;
            Ok(HelperMessage::Percentage(parse_percentage(fields[1])?))
        }
        "item-progress" => {
            field_count(command, &fields, 4)?;
            let package_id = parse_package_id(fields[1])?;
            let status = Status::from_text(fields[2]);
            if status == Status::Unknown {
                return Err(ProtocolError::UnknownEnum {
                    kind: "Status",
                    value: fields[2].to_string(),
                });
            }
            Ok(HelperMessage::ItemProgress {
                package_id,
                status,
                percentage: parse_percentage(fields[3])?,
            })
        }
        "error" => {
            field_count(command, &fields, 3)?;
            let code = PkError::from_text(fields[1]);
            if code == PkError::Unknown {
                return Err(ProtocolError::UnknownEnum {
                    kind: "Error",
                    value: fields[1].to_string(),
                });
            }
            // helpers cannot emit newlines or format directives
            let details = restore_newlines(fields[2]).replace('%', "$");
            Ok(HelperMessage::ErrorCode {
                code,
                details,
            })
        }
        "requirerestart" => {
            field_count(command, &fields, 3)?;
            let restart = Restart::from_text(fields[1]);
            if restart == Restart::Unknown {
                return Err(ProtocolError::UnknownEnum {
                    kind: "Restart",
                    value: fields[1].to_string(),
                });
            }
            Ok(HelperMessage::RequireRestart {
                restart,
                package_id: parse_package_id(fields[2])?,
            })
        }
        "status" => {
            field_count(command, &fields, 2)?;
            let status = Status::from_text(fields[1]);
            if status == Status::Unknown {
                return Err(ProtocolError::UnknownEnum {
                    kind: "Status",
                    value: fields[1].to_string(),
                });
            }
            Ok(HelperMessage::Status(status))
        }
        "speed" => {
            field_count(command, &fields, 2)?;
            Ok(HelperMessage::Speed(parse_u64("speed", fields[1])?))
        }
        "download-size-remaining" => {
            field_count(command, &fields, 2)?;
            Ok(HelperMessage::DownloadSizeRemaining(parse_u64(
                "download_size_remaining",
                fields[1],
            )?))
        }
        "allow-cancel" => {
            field_count(command, &fields, 2)?;
            Ok(HelperMessage::AllowCancel(parse_bool(fields[1])?))
        }
        "no-percentage-updates" => {
            field_count(command, &fields, 1)?;
            Ok(HelperMessage::NoPercentageUpdates)
        }
        "repo-signature-required" => {
            field_count(command, &fields, 9)?;
            nonblank("package_id", fields[1])?;
            nonblank("repository name", fields[2])?;
            let sig_type = SigType::from_text(fields[8]);
            if sig_type == SigType::Unknown {
                return Err(ProtocolError::UnknownEnum {
                    kind: "Sig",
                    value: fields[8].to_string(),
                });
            }
            Ok(HelperMessage::RepoSignatureRequired(Box::new(
                RepoSignature {
                    package_id: parse_package_id(fields[1])?,
                    repo_id: fields[2].to_string(),
                    url: fields[3].to_string(),
                    key_name: fields[4].to_string(),
                    key_id: fields[5].to_string(),
                    fingerprint: fields[6].to_string(),
                    timestamp: fields[7].to_string(),
                    sig_type,
                },
            )))
        }
        "eula-required" => {
            field_count(command, &fields, 5)?;
            nonblank("eula_id", fields[1])?;
            nonblank("package_id", fields[2])?;
            nonblank("agreement name", fields[4])?;
            Ok(HelperMessage::EulaRequired {
                eula_id: fields[1].to_string(),
                package_id: parse_package_id(fields[2])?,
                vendor: fields[3].to_string(),
                license_agreement: fields[4].to_string(),
            })
        }
        "media-change-required" => {
            field_count(command, &fields, 4)?;
            let media_type = MediaType::from_text(fields[1]);
            if media_type == MediaType::Unknown {
                return Err(ProtocolError::UnknownEnum {
                    kind: "media type",
                    value: fields[1].to_string(),
                });
            }
            Ok(HelperMessage::MediaChangeRequired {
                media_type,
                media_id: fields[2].to_string(),
                media_text: fields[3].to_string(),
            })
        }
        "distro-upgrade" => {
            field_count(command, &fields, 4)?;
            let state = DistroUpgradeState::from_text(fields[1]);
            if state == DistroUpgradeState::Unknown {
                return Err(ProtocolError::UnknownEnum {
                    kind: "distro upgrade",
                    value: fields[1].to_string(),
                });
            }
            Ok(HelperMessage::DistroUpgrade(DistroUpgrade {
                state,
                name: fields[2].to_string(),
                summary: squash_delimiters(fields[3]),
            }))
        }
        "category" => {
            field_count(command, &fields, 6)?;
            if fields[1] == fields[2] {
                return Err(ProtocolError::CategoryParentCycle);
            }
            nonblank("cat_id", fields[2])?;
            nonblank("name", fields[3])?;
            nonblank("icon", fields[5])?;
            if fields[5].starts_with('/') {
                return Err(ProtocolError::IconIsPath(fields[5].to_string()));
            }
            Ok(HelperMessage::Category(Category {
                parent_id: fields[1].to_string(),
                cat_id: fields[2].to_string(),
                name: fields[3].to_string(),
                summary: squash_delimiters(fields[4]),
                icon: fields[5].to_string(),
            }))
        }
        other => Err(ProtocolError::UnknownCommand(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package() {
        let msg = parse_line("package\tavailable\thal;0.5.8;i386;fedora\tHardware layer").unwrap();
        match msg {
            HelperMessage::Package {
                info,
                package_id,
                summary,
            } => {
                assert_eq!(info, Info::Available);
                assert_eq!(package_id.name(), "hal");
                assert_eq!(summary, "Hardware layer");
            }
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_package_rejects_unknown_info() {
        assert_eq!(
            parse_line("package\tshiny\thal;0.5.8;i386;fedora\tx"),
            Err(ProtocolError::UnknownEnum {
                kind: "Info",
                value: "shiny".to_string()
            })
        );
    }

    #[test]
    fn test_package_rejects_bad_id() {
        assert!(matches!(
            parse_line("package\tavailable\tnot-an-id\tx"),
            Err(ProtocolError::InvalidPackageId(_))
        ));
    }

    #[test]
    fn test_field_count_mismatch() {
        assert!(matches!(
            parse_line("package\tavailable"),
            Err(ProtocolError::FieldCount { .. })
        ));
        assert!(matches!(
            parse_line("finished\textra"),
            Err(ProtocolError::FieldCount { .. })
        ));
    }

    #[test]
    fn test_details_restores_newlines() {
        let msg = parse_line(
            "details\thal;0.5.8;i386;fedora\tHAL\tGPLv2\tsystem\tline one;line two\thttp://hal.org\t2048",
        )
        .unwrap();
        match msg {
            HelperMessage::Details(details) => {
                assert_eq!(details.description, "line one\nline two");
                assert_eq!(details.group, Group::System);
                assert_eq!(details.size, 2048);
            }
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_details_rejects_absurd_size() {
        let line = "details\thal;0.5.8;i386;fedora\tHAL\tGPLv2\tsystem\tdesc\turl\t2073741824";
        assert_eq!(parse_line(line), Err(ProtocolError::PackageSizeTooLarge));
    }

    #[test]
    fn test_percentage_range() {
        assert!(matches!(
            parse_line("percentage\t42").unwrap(),
            HelperMessage::Percentage(42)
        ));
        assert!(parse_line("percentage\t101").is_err());
        assert!(parse_line("percentage\t-1").is_err());
        assert!(parse_line("percentage\tNaN").is_err());
    }

    #[test]
    fn test_error_text_substitution() {
        let msg = parse_line("error\tno-network\tcould not contact mirror;retry at 100%").unwrap();
        match msg {
            HelperMessage::ErrorCode {
                code,
                details,
            } => {
                assert_eq!(code, PkError::NoNetwork);
                assert_eq!(details, "could not contact mirror\nretry at 100$");
            }
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_repo_signature_required() {
        let line = "repo-signature-required\tdummy;0.0.1;i386;data\tfedora\thttps://mirror\tFedora Key\tBB09BE93\tDEADBEEF\t2024-01-01\tgpg";
        match parse_line(line).unwrap() {
            HelperMessage::RepoSignatureRequired(sig) => {
                assert_eq!(sig.repo_id, "fedora");
                assert_eq!(sig.key_id, "BB09BE93");
                assert_eq!(sig.sig_type, SigType::Gpg);
            }
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_signature_blank_repo_rejected() {
        let line = "repo-signature-required\tdummy;0.0.1;i386;data\t\turl\tname\tkey\tfp\tts\tgpg";
        assert_eq!(
            parse_line(line),
            Err(ProtocolError::BlankField("repository name"))
        );
    }

    #[test]
    fn test_category_validation() {
        assert_eq!(
            parse_line("category\tapps\tapps\tApps\tsummary\ticon"),
            Err(ProtocolError::CategoryParentCycle)
        );
        assert!(matches!(
            parse_line("category\t\tapps\tApps\tsummary\t/usr/share/icon.png"),
            Err(ProtocolError::IconIsPath(_))
        ));
        assert!(parse_line("category\t\tapps\tApps\tsummary\tapplications-other").is_ok());
    }

    #[test]
    fn test_updatedetail_lists() {
        let line = "updatedetail\thal;0.5.8;i386;updates\thal;0.5.7;i386;installed&dbus;1.0;i386;installed\t\thttp://vendor\thttp://bugs;http://more\tCVE-2024-1\tsystem\tfix things;really\tchangelog\tstable\t2024-01-01T00:00:00Z\t";
        match parse_line(line).unwrap() {
            HelperMessage::UpdateDetail(detail) => {
                assert_eq!(detail.updates.len(), 2);
                assert!(detail.obsoletes.is_empty());
                assert_eq!(detail.bugzilla_urls.len(), 2);
                assert_eq!(detail.restart, Restart::System);
                assert_eq!(detail.update_text, "fix things\nreally");
                assert_eq!(detail.state, UpdateState::Stable);
                assert!(detail.issued.is_some());
                assert!(detail.updated.is_none());
            }
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_line("frobnicate\t1"),
            Err(ProtocolError::UnknownCommand("frobnicate".to_string()))
        );
    }

    #[test]
    fn test_no_percentage_updates() {
        assert!(matches!(
            parse_line("no-percentage-updates").unwrap(),
            HelperMessage::NoPercentageUpdates
        ));
    }

    #[test]
    fn test_allow_cancel() {
        assert!(matches!(
            parse_line("allow-cancel\ttrue").unwrap(),
            HelperMessage::AllowCancel(true)
        ));
        assert!(parse_line("allow-cancel\tmaybe").is_err());
    }
}
