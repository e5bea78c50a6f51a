//! The two ways a character's volumes are found in the catalog: the direct
//! credits lookup (cheap, known-incomplete upstream) and page fetches for
//! the exhaustive issues sweep. The sweep loop itself lives in the pipeline,
//! which owns checkpointing and the page budget.

use serde::Deserialize;

use crate::comicvine::{ComicVineClient, Envelope, VolumeRef, PAGE_SIZE};
use crate::error::SyncError;

#[derive(Debug, Default, Deserialize)]
struct CharacterDetail {
    #[serde(default)]
    volume_credits: Vec<VolumeRef>,
}

#[derive(Debug, Deserialize)]
struct IssueRecord {
    #[serde(default)]
    volume: Option<VolumeRef>,
}

/// One page of the issues sweep
#[derive(Debug)]
pub struct IssuePage {
    /// Total matching issues reported by the catalog
    pub total: i64,
    /// Volume references extracted from this page's issues
    pub volumes: Vec<VolumeRef>,
}

/// Numeric suffix of a namespace-qualified id ("4005-1443" -> "1443").
pub fn character_suffix(char_id: &str) -> &str {
    char_id.rsplit('-').next().unwrap_or(char_id)
}

/// ceil(total / page_size), clamped at zero for nonsense totals.
pub fn total_pages(total: i64, page_size: u64) -> u64 {
    if total <= 0 {
        return 0;
    }
    (total as u64).div_ceil(page_size)
}

/// Strategy A: the character's full credits list in one request. The
/// upstream list can be incomplete, which is why the sweep exists.
pub async fn credits_volumes(
    cv: &ComicVineClient,
    char_id: &str,
) -> Result<Vec<VolumeRef>, SyncError> {
    let path = format!("character/{}/", char_id);
    let envelope = cv
        .search(&path, &[("field_list", "id,name,volume_credits".to_string())])
        .await?;
    parse_credits(envelope)
}

/// Strategy B, one step: fetch the page of character-tagged issues at
/// `offset` and report the catalog's total alongside the volumes seen.
pub async fn issue_page(
    cv: &ComicVineClient,
    char_suffix: &str,
    offset: u64,
) -> Result<IssuePage, SyncError> {
    let envelope = cv
        .search(
            "issues/",
            &[
                ("field_list", "id,volume".to_string()),
                ("filter", format!("character_credits:{}", char_suffix)),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
                ("sort", "id:asc".to_string()),
            ],
        )
        .await?;
    parse_issue_page(envelope)
}

fn parse_credits(envelope: Envelope) -> Result<Vec<VolumeRef>, SyncError> {
    let detail: CharacterDetail = if envelope.results.is_null() {
        CharacterDetail::default()
    } else {
        serde_json::from_value(envelope.results)?
    };
    Ok(detail
        .volume_credits
        .into_iter()
        .filter(|v| v.id != 0)
        .collect())
}

fn parse_issue_page(envelope: Envelope) -> Result<IssuePage, SyncError> {
    let records: Vec<IssueRecord> = if envelope.results.is_null() {
        Vec::new()
    } else {
        serde_json::from_value(envelope.results)?
    };
    let volumes = records
        .into_iter()
        .filter_map(|r| r.volume)
        .filter(|v| v.id != 0)
        .collect();
    Ok(IssuePage {
        total: envelope.number_of_total_results,
        volumes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_suffix() {
        assert_eq!(character_suffix("4005-1443"), "1443");
        assert_eq!(character_suffix("1443"), "1443");
    }

    #[test]
    fn test_total_pages_math() {
        assert_eq!(total_pages(0, 100), 0);
        assert_eq!(total_pages(-3, 100), 0);
        assert_eq!(total_pages(1, 100), 1);
        assert_eq!(total_pages(100, 100), 1);
        assert_eq!(total_pages(101, 100), 2);
        assert_eq!(total_pages(2470, 100), 25);
    }

    #[test]
    fn test_parse_credits() {
        let envelope: Envelope = serde_json::from_str(
            r#"{
                "status_code": 1,
                "results": {
                    "id": 1443,
                    "name": "Peter Parker",
                    "volume_credits": [
                        {"id": 2127, "name": "Untold Tales"},
                        {"id": 0, "name": "bogus"},
                        {"id": 9}
                    ]
                }
            }"#,
        )
        .unwrap();
        let vols = parse_credits(envelope).unwrap();
        assert_eq!(vols.len(), 2);
        assert_eq!(vols[0].id, 2127);
        assert_eq!(vols[0].name.as_deref(), Some("Untold Tales"));
        assert_eq!(vols[1].id, 9);
        assert_eq!(vols[1].name, None);
    }

    #[test]
    fn test_parse_credits_tolerates_missing_list() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"status_code": 1, "results": {"id": 1443}}"#).unwrap();
        assert!(parse_credits(envelope).unwrap().is_empty());
    }

    #[test]
    fn test_parse_issue_page() {
        let envelope: Envelope = serde_json::from_str(
            r#"{
                "status_code": 1,
                "number_of_total_results": 250,
                "results": [
                    {"id": 1, "volume": {"id": 2127, "name": "Untold Tales"}},
                    {"id": 2, "volume": {"id": 2127, "name": "Untold Tales"}},
                    {"id": 3},
                    {"id": 4, "volume": {"id": 9}}
                ]
            }"#,
        )
        .unwrap();
        let page = parse_issue_page(envelope).unwrap();
        assert_eq!(page.total, 250);
        assert_eq!(page.volumes.len(), 3);
        assert_eq!(page.volumes[2].id, 9);
    }

    #[test]
    fn test_parse_issue_page_with_null_results() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"status_code": 1, "number_of_total_results": 0}"#).unwrap();
        let page = parse_issue_page(envelope).unwrap();
        assert_eq!(page.total, 0);
        assert!(page.volumes.is_empty());
    }
}
