//! The probe itself: bucket check and object listing

use chrono::{DateTime, Utc};

use crate::error::ProbeError;
use crate::store::ObjectStore;

const MEGABYTE: f64 = 1024.0 * 1024.0;

/// Printable outcome of a probe
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub lines: Vec<String>,
    pub bucket_exists: bool,
    /// Objects matching the session, or `.wav` objects when no session was given
    pub found: usize,
}

impl ProbeReport {
    fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

/// Check `bucket` and describe either the objects of `session` or every
/// `.wav` recording in it
///
/// A failed stat of one recording is reported inline; only bucket and listing
/// failures abort the probe.
pub async fn probe(
    store: &dyn ObjectStore,
    bucket: &str,
    session: Option<&str>,
) -> Result<ProbeReport, ProbeError> {
    let mut report = ProbeReport::default();

    if !store.bucket_exists(bucket).await? {
        report.line(format!("❌ Bucket '{}' does not exist!", bucket));
        return Ok(report);
    }
    report.bucket_exists = true;
    report.line(format!("✅ Bucket '{}' exists", bucket));
    report.line("");

    let objects = store.list_objects(bucket).await?;

    match session {
        Some(session) => {
            report.line(format!("🔍 Looking for session: {}", session));
            report.line("");
            for object in objects.iter().filter(|o| o.key.contains(session)) {
                let stat = store.stat_object(bucket, &object.key).await?;
                report.found += 1;
                report.line(format!("✅ Found: {}", object.key));
                report.line(format!(
                    "   Size: {} bytes ({})",
                    stat.size,
                    megabytes(stat.size)
                ));
                report.line(format!("   Last Modified: {}", timestamp(stat.last_modified)));
                report.line(format!(
                    "   Content-Type: {}",
                    stat.content_type.as_deref().unwrap_or("unknown")
                ));
                report.line("");
            }
            if report.found == 0 {
                report.line(format!("❌ No files found for session {}", session));
            }
        }
        None => {
            report.line("📋 Listing all audio files in bucket:");
            report.line("");
            if objects.is_empty() {
                report.line("   No files found in bucket");
                return Ok(report);
            }
            report.line(format!("   Found {} file(s):", objects.len()));
            report.line("");
            for object in objects.iter().filter(|o| o.key.ends_with(".wav")) {
                match store.stat_object(bucket, &object.key).await {
                    Ok(stat) => {
                        report.found += 1;
                        report.line(format!("   📄 {}", object.key));
                        report.line(format!("      Size: {}", megabytes(stat.size)));
                        report.line(format!("      Modified: {}", timestamp(stat.last_modified)));
                        report.line("");
                    }
                    Err(e) => {
                        log::debug!("stat of {} failed: {:?}", object.key, e);
                        report.line(format!(
                            "   ⚠️  {} (error getting stats: {})",
                            object.key, e
                        ));
                    }
                }
            }
        }
    }

    Ok(report)
}

fn megabytes(size: i64) -> String {
    format!("{:.2} MB", size as f64 / MEGABYTE)
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%:z").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MockObjectStore, ObjectStat, ObjectSummary};
    use chrono::TimeZone;

    fn summary(key: &str, size: i64) -> ObjectSummary {
        ObjectSummary {
            key: key.to_string(),
            size,
        }
    }

    fn stat(size: i64) -> ObjectStat {
        ObjectStat {
            size,
            last_modified: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()),
            content_type: Some("audio/wav".to_string()),
        }
    }

    #[tokio::test]
    async fn test_missing_bucket_stops_the_probe() {
        let mut store = MockObjectStore::new();
        store.expect_bucket_exists().times(1).returning(|_| Ok(false));
        store.expect_list_objects().never();

        let report = probe(&store, "records", None).await.unwrap();
        assert!(!report.bucket_exists);
        assert_eq!(report.lines, vec!["❌ Bucket 'records' does not exist!".to_string()]);
    }

    #[tokio::test]
    async fn test_session_objects_are_described() {
        let mut store = MockObjectStore::new();
        store.expect_bucket_exists().returning(|_| Ok(true));
        store.expect_list_objects().returning(|_| {
            Ok(vec![
                summary("sessions/abc-123/chunk_0.wav", 3_145_728),
                summary("sessions/other/chunk_0.wav", 10),
            ])
        });
        store
            .expect_stat_object()
            .times(1)
            .returning(|_, key| {
                assert_eq!(key, "sessions/abc-123/chunk_0.wav");
                Ok(stat(3_145_728))
            });

        let report = probe(&store, "records", Some("abc-123")).await.unwrap();
        assert_eq!(report.found, 1);
        assert!(report.lines.contains(&"✅ Found: sessions/abc-123/chunk_0.wav".to_string()));
        assert!(report.lines.contains(&"   Size: 3145728 bytes (3.00 MB)".to_string()));
        assert!(report
            .lines
            .contains(&"   Last Modified: 2024-03-01 12:30:00+00:00".to_string()));
        assert!(report.lines.contains(&"   Content-Type: audio/wav".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let mut store = MockObjectStore::new();
        store.expect_bucket_exists().returning(|_| Ok(true));
        store
            .expect_list_objects()
            .returning(|_| Ok(vec![summary("sessions/other/chunk_0.wav", 10)]));
        store.expect_stat_object().never();

        let report = probe(&store, "records", Some("abc-123")).await.unwrap();
        assert_eq!(report.found, 0);
        assert_eq!(
            report.lines.last().map(String::as_str),
            Some("❌ No files found for session abc-123")
        );
    }

    #[tokio::test]
    async fn test_empty_bucket() {
        let mut store = MockObjectStore::new();
        store.expect_bucket_exists().returning(|_| Ok(true));
        store.expect_list_objects().returning(|_| Ok(Vec::new()));

        let report = probe(&store, "records", None).await.unwrap();
        assert_eq!(
            report.lines.last().map(String::as_str),
            Some("   No files found in bucket")
        );
    }

    #[tokio::test]
    async fn test_listing_details_wav_files_and_tolerates_stat_errors() {
        let mut store = MockObjectStore::new();
        store.expect_bucket_exists().returning(|_| Ok(true));
        store.expect_list_objects().returning(|_| {
            Ok(vec![
                summary("a/chunk_0.wav", 1_048_576),
                summary("a/meta.json", 12),
                summary("b/broken.wav", 0),
            ])
        });
        store.expect_stat_object().times(2).returning(|_, key| {
            if key == "b/broken.wav" {
                Err(ProbeError::StatObject {
                    key: key.to_string(),
                    message: "NoSuchKey".to_string(),
                })
            } else {
                Ok(stat(1_048_576))
            }
        });

        let report = probe(&store, "records", None).await.unwrap();
        assert_eq!(report.found, 1);
        assert!(report.lines.contains(&"   Found 3 file(s):".to_string()));
        assert!(report.lines.contains(&"   📄 a/chunk_0.wav".to_string()));
        assert!(report.lines.contains(&"      Size: 1.00 MB".to_string()));
        assert!(!report.lines.iter().any(|l| l.contains("meta.json")));
        assert!(report
            .lines
            .iter()
            .any(|l| l.starts_with("   ⚠️  b/broken.wav (error getting stats:")));
    }

    #[tokio::test]
    async fn test_listing_failure_is_an_error() {
        let mut store = MockObjectStore::new();
        store.expect_bucket_exists().returning(|_| Ok(true));
        store.expect_list_objects().returning(|bucket| {
            Err(ProbeError::ListObjects {
                bucket: bucket.to_string(),
                message: "AccessDenied".to_string(),
            })
        });

        let err = probe(&store, "records", None).await.unwrap_err();
        assert!(err.to_string().contains("AccessDenied"));
    }
}
