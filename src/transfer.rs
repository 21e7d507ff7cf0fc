//! Export and import of the whole data set as one JSON document.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cubes::CubeTypeList;
use crate::model::{NewSolve, RecordMap, Settings, SolveEntry};
use crate::storage::{ApiRequest, StorageError, TimerStorage};

pub const DEFAULT_EXPORT_FILE: &str = "rubik_timer_data.json";

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid import document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Stopped after {applied} of {total} steps: {source}")]
    Partial {
        applied: usize,
        total: usize,
        #[source]
        source: StorageError,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportDocument {
    pub times: Vec<SolveEntry>,
    pub records: RecordMap,
    pub cubes: CubeTypeList,
    pub settings: Settings,
}

/// Every section is optional; absent sections are left alone on import.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ImportDocument {
    #[serde(default)]
    pub times: Option<Vec<SolveEntry>>,
    #[serde(default)]
    pub records: Option<RecordMap>,
    #[serde(default)]
    pub cubes: Option<Vec<String>>,
    #[serde(default)]
    pub settings: Option<Settings>,
}

pub fn parse_import(text: &str) -> Result<ImportDocument, TransferError> {
    Ok(serde_json::from_str(text)?)
}

/// Requests that replace the backend contents with `doc`, in order.
/// Times are re-created without their ids; the backend assigns new ones.
pub fn import_plan(doc: &ImportDocument) -> Vec<ApiRequest> {
    let mut plan = Vec::new();
    if let Some(times) = &doc.times {
        plan.push(ApiRequest::ClearTimes);
        plan.extend(times.iter().map(|t| ApiRequest::AddTime(NewSolve::from(t))));
    }
    if let Some(records) = &doc.records {
        plan.push(ApiRequest::SaveRecords(records.clone()));
    }
    if let Some(cubes) = &doc.cubes {
        plan.push(ApiRequest::ClearCubes);
        let unique = CubeTypeList::from(cubes.clone());
        plan.extend(unique.names().iter().map(|c| ApiRequest::AddCube(c.clone())));
    }
    if let Some(settings) = &doc.settings {
        plan.push(ApiRequest::SaveSettings(settings.clone().normalized()));
    }
    plan
}

/// Runs `plan` one request at a time and stops at the first failure.
/// Steps already sent stay applied.
pub async fn run_import(storage: &TimerStorage, plan: &[ApiRequest]) -> Result<usize, TransferError> {
    for (applied, request) in plan.iter().enumerate() {
        if let Err(source) = storage.run(request).await {
            log::error!("Import step {} failed: {}", request.describe(), source);
            return Err(TransferError::Partial {
                applied,
                total: plan.len(),
                source,
            });
        }
    }
    log::info!("Imported {} steps", plan.len());
    Ok(plan.len())
}

pub async fn export(storage: &TimerStorage) -> Result<ExportDocument, TransferError> {
    Ok(ExportDocument {
        times: storage.load_times().await?,
        records: storage.load_records().await?,
        cubes: storage.load_cubes().await?,
        settings: storage.load_settings().await?,
    })
}

pub fn write_export(path: &Path, doc: &ExportDocument) -> Result<(), TransferError> {
    let text = serde_json::to_string_pretty(doc)?;
    fs::write(path, text).map_err(|source| TransferError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_import(path: &Path) -> Result<ImportDocument, TransferError> {
    let text = fs::read_to_string(path).map_err(|source| TransferError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_import(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> ExportDocument {
        ExportDocument {
            times: vec![SolveEntry {
                id: Some(9),
                cube: "3x3".into(),
                ms: 12_345,
                record: true,
                timestamp: "2024-05-01T10:00:00.000Z".into(),
            }],
            records: vec![("3x3".to_string(), 12_345)].into_iter().collect(),
            cubes: vec!["3x3".to_string(), "Clock".to_string()].into(),
            settings: Settings::default(),
        }
    }

    #[test]
    fn test_export_file_reimports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_EXPORT_FILE);
        write_export(&path, &document()).unwrap();

        let doc = read_import(&path).unwrap();
        assert_eq!(doc.times.as_ref().unwrap()[0].ms, 12_345);
        assert_eq!(doc.cubes, Some(vec!["3x3".to_string(), "Clock".to_string()]));
        assert_eq!(doc.settings, Some(Settings::default()));
    }

    #[test]
    fn test_import_plan_order() {
        let text = json!({
            "times": [
                {"id": 4, "cube": "2x2", "ms": 3000.7, "record": true, "timestamp": "a"},
                {"id": 5, "cube": "2x2", "ms": 3500, "record": false, "timestamp": "b"}
            ],
            "records": {"2x2": 3000},
            "cubes": ["2x2", "2x2", "Skewb"],
            "settings": {"language": "fa", "inspectionTime": 0}
        })
        .to_string();
        let plan = import_plan(&parse_import(&text).unwrap());

        let shapes: Vec<String> = plan.iter().map(ApiRequest::describe).collect();
        assert_eq!(
            shapes,
            vec![
                "POST /times/clear",
                "POST /times",
                "POST /times",
                "POST /records",
                "POST /cubes/clear",
                "POST /cubes",
                "POST /cubes",
                "POST /settings",
            ]
        );
        match &plan[1] {
            ApiRequest::AddTime(solve) => {
                assert_eq!(solve.ms, 3_000);
                assert_eq!(serde_json::to_value(solve).unwrap().get("id"), None);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &plan[7] {
            ApiRequest::SaveSettings(settings) => assert_eq!(settings.inspection_time, 15),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_imported_time_without_timestamp_omits_it() {
        let text = r#"{"times": [{"cube": "3x3", "ms": 9000}]}"#;
        let plan = import_plan(&parse_import(text).unwrap());
        let body = plan[1].body().unwrap().unwrap();
        assert_eq!(body, json!({"cube": "3x3", "ms": 9000, "record": false}));
    }

    #[test]
    fn test_partial_document_only_touches_present_sections() {
        let plan = import_plan(&parse_import(r#"{"records": {}}"#).unwrap());
        assert_eq!(plan, vec![ApiRequest::SaveRecords(RecordMap::default())]);
        assert!(import_plan(&parse_import("{}").unwrap()).is_empty());
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(parse_import("not json"), Err(TransferError::Parse(_))));
        assert!(matches!(
            parse_import(r#"{"times": [{"cube": "3x3", "ms": "fast"}]}"#),
            Err(TransferError::Parse(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(read_import(&missing), Err(TransferError::Io { .. })));
    }
}
