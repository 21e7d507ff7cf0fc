//! REST persistence for solves, records, cube types and settings.
//!
//! Every call is described by an [`ApiRequest`] first, so request shapes can
//! be inspected and queued (see the import plan) without a live backend.

use reqwest::header::ACCEPT;
use reqwest::Url;
use serde_json::{json, Value};
use thiserror::Error;

use crate::cubes::CubeTypeList;
use crate::model::{NewSolve, RecordMap, Settings, SolveEntry};

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:5000/api";

const TIMES: &str = "times";
const RECORDS: &str = "records";
const CUBES: &str = "cubes";
const SETTINGS: &str = "settings";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid API base URL {url}: {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{request} failed with HTTP {status}: {body}")]
    Status {
        request: String,
        status: u16,
        body: String,
    },

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ApiRequest {
    LoadTimes,
    AddTime(NewSolve),
    DeleteTime(u64),
    RetypeTime { id: u64, cube: String },
    ClearTimes,
    LoadRecords,
    SaveRecords(RecordMap),
    ClearRecords,
    LoadCubes,
    AddCube(String),
    RemoveCube(String),
    RenameCube { old_name: String, new_name: String },
    ClearCubes,
    LoadSettings,
    SaveSettings(Settings),
}

impl ApiRequest {
    pub fn method(&self) -> Method {
        match self {
            ApiRequest::LoadTimes
            | ApiRequest::LoadRecords
            | ApiRequest::LoadCubes
            | ApiRequest::LoadSettings => Method::Get,
            ApiRequest::DeleteTime(_) | ApiRequest::RemoveCube(_) => Method::Delete,
            ApiRequest::RetypeTime { .. } => Method::Put,
            ApiRequest::AddTime(_)
            | ApiRequest::ClearTimes
            | ApiRequest::SaveRecords(_)
            | ApiRequest::ClearRecords
            | ApiRequest::AddCube(_)
            | ApiRequest::RenameCube { .. }
            | ApiRequest::ClearCubes
            | ApiRequest::SaveSettings(_) => Method::Post,
        }
    }

    /// Path below the API base, one entry per segment (not yet escaped).
    pub fn segments(&self) -> Vec<String> {
        match self {
            ApiRequest::LoadTimes | ApiRequest::AddTime(_) => vec![TIMES.into()],
            ApiRequest::DeleteTime(id) => vec![TIMES.into(), id.to_string()],
            ApiRequest::RetypeTime { id, .. } => vec![TIMES.into(), id.to_string(), "type".into()],
            ApiRequest::ClearTimes => vec![TIMES.into(), "clear".into()],
            ApiRequest::LoadRecords | ApiRequest::SaveRecords(_) => vec![RECORDS.into()],
            ApiRequest::ClearRecords => vec![RECORDS.into(), "clear".into()],
            ApiRequest::LoadCubes | ApiRequest::AddCube(_) => vec![CUBES.into()],
            ApiRequest::RemoveCube(name) => vec![CUBES.into(), name.clone()],
            ApiRequest::RenameCube { .. } => vec![CUBES.into(), "rename".into()],
            ApiRequest::ClearCubes => vec![CUBES.into(), "clear".into()],
            ApiRequest::LoadSettings | ApiRequest::SaveSettings(_) => vec![SETTINGS.into()],
        }
    }

    pub fn body(&self) -> Result<Option<Value>, serde_json::Error> {
        let body = match self {
            ApiRequest::LoadTimes
            | ApiRequest::LoadRecords
            | ApiRequest::LoadCubes
            | ApiRequest::LoadSettings
            | ApiRequest::DeleteTime(_)
            | ApiRequest::RemoveCube(_) => None,
            ApiRequest::ClearTimes | ApiRequest::ClearRecords | ApiRequest::ClearCubes => {
                Some(json!({}))
            }
            ApiRequest::AddTime(solve) => Some(serde_json::to_value(solve)?),
            ApiRequest::RetypeTime { cube, .. } => Some(json!({ "cube": cube })),
            ApiRequest::SaveRecords(records) => Some(serde_json::to_value(records)?),
            ApiRequest::AddCube(name) => Some(json!({ "cube": name })),
            ApiRequest::RenameCube { old_name, new_name } => {
                Some(json!({ "oldName": old_name, "newName": new_name }))
            }
            ApiRequest::SaveSettings(settings) => Some(serde_json::to_value(settings)?),
        };
        Ok(body)
    }

    /// Short form for logs and error messages, e.g. `DELETE /times/4`.
    pub fn describe(&self) -> String {
        let method = match self.method() {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        format!("{} /{}", method, self.segments().join("/"))
    }
}

/// Everything the client caches, as fetched at startup or after an import.
/// A collection that failed to load is `None` and the cache keeps its value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub settings: Option<Settings>,
    pub cubes: Option<CubeTypeList>,
    pub times: Option<Vec<SolveEntry>>,
    pub records: Option<RecordMap>,
}

fn loaded<T>(what: &str, result: Result<T, StorageError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::error!("Failed to load {}: {}", what, e);
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct TimerStorage {
    client: reqwest::Client,
    base: Url,
}

impl TimerStorage {
    pub fn new(base_url: &str) -> Result<Self, StorageError> {
        let base = Url::parse(base_url).map_err(|e| StorageError::BaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(StorageError::BaseUrl {
                url: base_url.to_string(),
                reason: "not a hierarchical URL".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("cubetimer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }

    pub fn endpoint(&self, request: &ApiRequest) -> Result<Url, StorageError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::BaseUrl {
                url: self.base.to_string(),
                reason: "not a hierarchical URL".to_string(),
            })?
            .pop_if_empty()
            .extend(request.segments());
        Ok(url)
    }

    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, StorageError> {
        let url = self.endpoint(request)?;
        log::debug!("{}", request.describe());

        let builder = match request.method() {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        };
        let builder = match request.body()? {
            Some(body) => builder.json(&body),
            None => builder,
        };

        let response = builder.header(ACCEPT, "application/json").send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Status {
                request: request.describe(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Sends a request whose response body is not needed.
    pub async fn run(&self, request: &ApiRequest) -> Result<(), StorageError> {
        self.send(request).await.map(|_| ())
    }

    pub async fn load_times(&self) -> Result<Vec<SolveEntry>, StorageError> {
        Ok(self.send(&ApiRequest::LoadTimes).await?.json().await?)
    }

    /// Creates a solve and returns it with the id the backend assigned.
    pub async fn add_time(&self, solve: NewSolve) -> Result<SolveEntry, StorageError> {
        Ok(self.send(&ApiRequest::AddTime(solve)).await?.json().await?)
    }

    pub async fn load_records(&self) -> Result<RecordMap, StorageError> {
        Ok(self.send(&ApiRequest::LoadRecords).await?.json().await?)
    }

    pub async fn load_cubes(&self) -> Result<CubeTypeList, StorageError> {
        Ok(self.send(&ApiRequest::LoadCubes).await?.json().await?)
    }

    pub async fn load_settings(&self) -> Result<Settings, StorageError> {
        let settings: Settings = self.send(&ApiRequest::LoadSettings).await?.json().await?;
        Ok(settings.normalized())
    }

    pub async fn load_snapshot(&self) -> Snapshot {
        Snapshot {
            settings: loaded("settings", self.load_settings().await),
            cubes: loaded("cubes", self.load_cubes().await),
            times: loaded("times", self.load_times().await),
            records: loaded("records", self.load_records().await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> TimerStorage {
        TimerStorage::new("http://127.0.0.1:5000/api").unwrap()
    }

    #[test]
    fn test_rejects_bad_base() {
        assert!(matches!(
            TimerStorage::new("not a url"),
            Err(StorageError::BaseUrl { .. })
        ));
        assert!(matches!(
            TimerStorage::new("mailto:someone@example.com"),
            Err(StorageError::BaseUrl { .. })
        ));
    }

    #[test]
    fn test_endpoints() {
        let s = storage();
        assert_eq!(
            s.endpoint(&ApiRequest::LoadTimes).unwrap().as_str(),
            "http://127.0.0.1:5000/api/times"
        );
        assert_eq!(
            s.endpoint(&ApiRequest::RetypeTime { id: 7, cube: "2x2".into() }).unwrap().as_str(),
            "http://127.0.0.1:5000/api/times/7/type"
        );
        assert_eq!(
            s.endpoint(&ApiRequest::ClearRecords).unwrap().as_str(),
            "http://127.0.0.1:5000/api/records/clear"
        );
    }

    #[test]
    fn test_trailing_slash_base() {
        let s = TimerStorage::new("http://localhost:5000/api/").unwrap();
        assert_eq!(
            s.endpoint(&ApiRequest::LoadCubes).unwrap().as_str(),
            "http://localhost:5000/api/cubes"
        );
    }

    #[test]
    fn test_cube_names_are_escaped_in_path() {
        let s = storage();
        let url = s.endpoint(&ApiRequest::RemoveCube("Square 1/OH".into())).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5000/api/cubes/Square%201%2FOH");
    }

    #[test]
    fn test_methods_and_bodies() {
        let rename = ApiRequest::RenameCube { old_name: "3x3".into(), new_name: "3x3 OH".into() };
        assert_eq!(rename.method(), Method::Post);
        assert_eq!(
            rename.body().unwrap(),
            Some(json!({"oldName": "3x3", "newName": "3x3 OH"}))
        );

        let retype = ApiRequest::RetypeTime { id: 3, cube: "Skewb".into() };
        assert_eq!(retype.method(), Method::Put);
        assert_eq!(retype.body().unwrap(), Some(json!({"cube": "Skewb"})));

        assert_eq!(ApiRequest::DeleteTime(3).method(), Method::Delete);
        assert_eq!(ApiRequest::DeleteTime(3).body().unwrap(), None);
        assert_eq!(ApiRequest::AddCube("Clock".into()).body().unwrap(), Some(json!({"cube": "Clock"})));
        assert_eq!(ApiRequest::LoadSettings.method(), Method::Get);
    }

    #[test]
    fn test_clearing_times_twice_sends_the_same_request() {
        let first = ApiRequest::ClearTimes;
        let second = ApiRequest::ClearTimes;
        assert_eq!(first, second);
        assert_eq!(first.describe(), "POST /times/clear");
        assert_eq!(first.body().unwrap(), second.body().unwrap());
        assert_eq!(first.body().unwrap(), Some(json!({})));
    }
}
