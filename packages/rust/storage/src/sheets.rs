//! Google Sheets v4 REST backend.
//!
//! Each table is one tab whose first row holds the column names. Data row
//! `index` lives on sheet row `index + 2`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};
use url::Url;

use ecospray_shared::{Result, SiteError, StoreConfig};

use crate::TabularStore;
use crate::schema::{Row, Table};

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchValueRanges {
    #[serde(default)]
    value_ranges: Vec<ValueRange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSpreadsheet {
    spreadsheet_id: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    message: String,
}

/// A spreadsheet addressed by id, authorized with an OAuth access token.
pub struct SheetsStore {
    client: Client,
    base: Url,
    spreadsheet_id: String,
    token: String,
}

impl SheetsStore {
    /// Connect to an existing spreadsheet.
    pub fn new(config: &StoreConfig, spreadsheet_id: &str, token: &str) -> Result<Self> {
        let client = build_client(config)?;
        let base = Url::parse(&config.sheets_base_url).map_err(|e| {
            SiteError::config(format!("invalid sheets_base_url {}: {e}", config.sheets_base_url))
        })?;

        Ok(Self {
            client,
            base,
            spreadsheet_id: spreadsheet_id.to_string(),
            token: token.to_string(),
        })
    }

    /// Create a new spreadsheet with one tab per table and every header row
    /// written, and return a store bound to it.
    #[instrument(skip_all, fields(title = %title))]
    pub async fn create_spreadsheet(config: &StoreConfig, token: &str, title: &str) -> Result<Self> {
        let mut store = Self::new(config, "", token)?;

        let sheets: Vec<Value> = Table::all()
            .iter()
            .map(|t| json!({ "properties": { "title": t.name() } }))
            .collect();
        let body = json!({ "properties": { "title": title }, "sheets": sheets });

        let url = store.url(&["v4", "spreadsheets"])?;
        let created: CreatedSpreadsheet = store
            .send_json(store.request(Method::POST, url).json(&body))
            .await?;
        store.spreadsheet_id = created.spreadsheet_id;
        store.write_headers(Table::all()).await?;

        info!(spreadsheet_id = %store.spreadsheet_id, "spreadsheet created");
        Ok(store)
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    /// Write the header row of every tab whose row 1 is empty. Returns how
    /// many tabs were given headers.
    ///
    /// Tabs that already carry a header row are left alone.
    #[instrument(skip_all, fields(spreadsheet_id = %self.spreadsheet_id))]
    pub async fn ensure_headers(&self) -> Result<usize> {
        let tables = Table::all();
        let mut url = self.url(&["v4", "spreadsheets", &self.spreadsheet_id, "values:batchGet"])?;
        {
            let mut query = url.query_pairs_mut();
            for table in tables {
                query.append_pair("ranges", &format!("'{}'!A1:ZZ1", table.name()));
            }
        }
        let batch: BatchValueRanges = self.send_json(self.request(Method::GET, url)).await?;

        let missing: Vec<Table> = tables
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                batch
                    .value_ranges
                    .get(*i)
                    .is_none_or(|range| range.values.iter().flatten().all(is_blank))
            })
            .map(|(_, table)| *table)
            .collect();

        if !missing.is_empty() {
            self.write_headers(&missing).await?;
            info!(tabs = missing.len(), "header rows written");
        }
        Ok(missing.len())
    }

    /// Write the column names into row 1 of each tab in one batch call.
    async fn write_headers(&self, tables: &[Table]) -> Result<()> {
        let data: Vec<Value> = tables
            .iter()
            .map(|t| json!({ "range": header_range(*t), "values": [t.columns()] }))
            .collect();
        let url = self.url(&["v4", "spreadsheets", &self.spreadsheet_id, "values:batchUpdate"])?;
        self.send(
            self.request(Method::POST, url)
                .json(&json!({ "valueInputOption": "RAW", "data": data })),
        )
        .await?;
        Ok(())
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SiteError::config(format!("sheets base URL cannot hold a path: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<Url> {
        let segment = format!("{range}{suffix}");
        self.url(&["v4", "spreadsheets", &self.spreadsheet_id, "values", &segment])
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| SiteError::request("Google Sheets", e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GoogleErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| format!("Google Sheets returned HTTP {status}"));
        Err(SiteError::upstream(Some(status.as_u16()), message))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| SiteError::parse(format!("unexpected Google Sheets response: {e}")))
    }

    async fn sheet_id(&self, table: Table) -> Result<i64> {
        let mut url = self.url(&["v4", "spreadsheets", &self.spreadsheet_id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");

        let meta: SpreadsheetMeta = self.send_json(self.request(Method::GET, url)).await?;
        meta.sheets
            .into_iter()
            .find(|s| s.properties.title == table.name())
            .map(|s| s.properties.sheet_id)
            .ok_or_else(|| {
                SiteError::upstream(None, format!("spreadsheet has no '{table}' sheet"))
            })
    }

    async fn ensure_row_exists(&self, table: Table, index: usize) -> Result<()> {
        let rows = self.read_rows(table).await?;
        if index >= rows.len() {
            return Err(SiteError::validation(format!(
                "row {index} does not exist in {table}"
            )));
        }
        Ok(())
    }
}

fn build_client(config: &StoreConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| SiteError::Network(format!("failed to build HTTP client: {e}")))
}

/// `'name'!A1`: the header row of a tab.
fn header_range(table: Table) -> String {
    format!("'{}'!A1", table.name())
}

fn is_blank(cell: &Value) -> bool {
    match cell {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn row_values(rows: &[Row]) -> Value {
    json!({ "values": rows })
}

#[async_trait]
impl TabularStore for SheetsStore {
    async fn read_rows(&self, table: Table) -> Result<Vec<Row>> {
        let url = self.values_url(&format!("'{}'!A2:ZZ", table.name()), "")?;
        let range: ValueRange = self.send_json(self.request(Method::GET, url)).await?;

        let width = table.columns().len();
        Ok(range
            .values
            .into_iter()
            .map(|cells| {
                let mut row: Row = cells
                    .iter()
                    .take(width)
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                row.resize(width, String::new());
                row
            })
            .collect())
    }

    async fn append_rows(&self, table: Table, rows: &[Row]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut url = self.values_url(&header_range(table), ":append")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        self.send(self.request(Method::POST, url).json(&row_values(rows)))
            .await?;
        debug!(%table, rows = rows.len(), "rows appended");
        Ok(rows.len())
    }

    async fn update_row(&self, table: Table, index: usize, row: &Row) -> Result<()> {
        self.ensure_row_exists(table, index).await?;

        let range = format!("'{}'!A{}", table.name(), index + 2);
        let mut url = self.values_url(&range, "")?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        self.send(
            self.request(Method::PUT, url)
                .json(&row_values(std::slice::from_ref(row))),
        )
        .await?;
        Ok(())
    }

    async fn delete_row(&self, table: Table, index: usize) -> Result<()> {
        self.ensure_row_exists(table, index).await?;
        let sheet_id = self.sheet_id(table).await?;

        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": index + 1,
                        "endIndex": index + 2
                    }
                }
            }]
        });
        let segment = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = self.url(&["v4", "spreadsheets", &segment])?;
        self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }

    async fn replace_rows(&self, table: Table, rows: &[Row]) -> Result<usize> {
        let url = self.values_url(&format!("'{}'!A2:ZZ", table.name()), ":clear")?;
        self.send(self.request(Method::POST, url).json(&json!({})))
            .await?;
        self.append_rows(table, rows).await
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> StoreConfig {
        StoreConfig {
            sheets_base_url: server.uri(),
            timeout_secs: 5,
            ..StoreConfig::default()
        }
    }

    fn store(server: &MockServer) -> SheetsStore {
        SheetsStore::new(&config(server), "sheet-1", "ya29.token").unwrap()
    }

    #[tokio::test]
    async fn reads_rows_below_header_and_pads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values/'stats'!A2:ZZ"))
            .and(header("authorization", "Bearer ya29.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "stats!A2:ZZ",
                "values": [["s1", "Homes insulated", "1200"], ["s2", "Years", "15", "+", "2"]]
            })))
            .mount(&server)
            .await;

        let rows = store(&server).read_rows(Table::Stats).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["s1", "Homes insulated", "1200", "", ""]);
        assert_eq!(rows[1][3], "+");
    }

    #[tokio::test]
    async fn empty_sheet_reads_as_no_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values/'pages'!A2:ZZ"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"range": "pages!A2:ZZ"})))
            .mount(&server)
            .await;

        let rows = store(&server).read_rows(Table::Pages).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn appends_with_insert_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values/'services'!A1:append"))
            .and(query_param("valueInputOption", "RAW"))
            .and(query_param("insertDataOption", "INSERT_ROWS"))
            .and(body_partial_json(json!({"values": [["1", "attic"]]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let written = store(&server)
            .append_rows(Table::Services, &[vec!["1".into(), "attic".into()]])
            .await
            .unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn appending_nothing_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let written = store(&server).append_rows(Table::Services, &[]).await.unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn delete_uses_sheet_id_and_offsets_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values/'navigation'!A2:ZZ"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [["n1"], ["n2"]]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1"))
            .and(query_param("fields", "sheets.properties"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [
                    {"properties": {"sheetId": 0, "title": "pages"}},
                    {"properties": {"sheetId": 77, "title": "navigation"}}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1:batchUpdate"))
            .and(body_partial_json(json!({"requests": [{"deleteDimension": {"range": {
                "sheetId": 77, "dimension": "ROWS", "startIndex": 2, "endIndex": 3
            }}}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        store(&server).delete_row(Table::Navigation, 1).await.unwrap();
    }

    #[tokio::test]
    async fn update_past_end_is_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values/'pages'!A2:ZZ"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": [["p1"]]})))
            .mount(&server)
            .await;

        let err = store(&server)
            .update_row(Table::Pages, 5, &vec!["p6".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::Validation { .. }));
    }

    #[tokio::test]
    async fn upstream_message_is_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "The caller does not have permission", "status": "PERMISSION_DENIED"}
            })))
            .mount(&server)
            .await;

        let err = store(&server).read_rows(Table::Pages).await.unwrap_err();
        match err {
            SiteError::Upstream { status, message } => {
                assert_eq!(status, Some(403));
                assert_eq!(message, "The caller does not have permission");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_spreadsheet_writes_every_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets"))
            .and(body_partial_json(json!({"properties": {"title": "EcoSpray CMS"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"spreadsheetId": "new-42"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/new-42/values:batchUpdate"))
            .and(body_partial_json(json!({"valueInputOption": "RAW"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let store = SheetsStore::create_spreadsheet(&config(&server), "ya29.token", "EcoSpray CMS")
            .await
            .unwrap();
        assert_eq!(store.spreadsheet_id(), "new-42");
    }

    #[tokio::test]
    async fn ensure_headers_fills_only_blank_tabs() {
        let server = MockServer::start().await;
        // `pages` has no header row; every other tab already has one.
        let mut ranges = vec![json!({"range": "'pages'!A1:ZZ1"})];
        ranges.extend(
            Table::all()[1..]
                .iter()
                .map(|t| json!({"range": header_range(*t), "values": [t.columns()]})),
        );
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values:batchGet"))
            .and(query_param("ranges", "'pages'!A1:ZZ1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "spreadsheetId": "sheet-1",
                "valueRanges": ranges
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values:batchUpdate"))
            .and(body_partial_json(json!({"valueInputOption": "RAW"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let written = store(&server).ensure_headers().await.unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn ensure_headers_leaves_existing_rows_alone() {
        let server = MockServer::start().await;
        let ranges: Vec<Value> = Table::all()
            .iter()
            .map(|t| json!({"range": header_range(*t), "values": [t.columns()]}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values:batchGet"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"valueRanges": ranges})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values:batchUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(store(&server).ensure_headers().await.unwrap(), 0);
    }
}
