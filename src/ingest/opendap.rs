/// OPeNDAP (DAP2) Data Client
///
/// Reads single grid points out of remote NetCDF datasets served through
/// THREDDS or Hyrax, without downloading whole files. Three DAP2 responses
/// are used:
///
/// - `<url>.dds`  : dataset structure: variables and their dimension order
/// - `<url>.das`  : attributes: packing (`scale_factor`, `add_offset`),
///                   fill values, time `units`
/// - `<url>.ascii?<constraint>`: the selected values as text
///
/// Protocol reference: https://www.opendap.org/pdf/ESE-RFC-004v1.2.pdf
use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::ingest::{GridHandle, GridSource, TimeUnits};
use crate::logging::{self, Component};
use crate::model::SourceError;

// ============================================================================
// Client
// ============================================================================

/// HTTP basic credentials sent with every request (NASA Earthdata login).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Blocking DAP2 client. Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct OpendapSource {
    client: reqwest::blocking::Client,
    credentials: Option<Credentials>,
}

impl OpendapSource {
    pub fn new(
        timeout: Duration,
        user_agent: &str,
        credentials: Option<Credentials>,
    ) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .cookie_store(true)
            .build()?;

        Ok(Self { client, credentials })
    }
}

impl GridSource for OpendapSource {
    type Handle = OpendapHandle;

    fn open(&self, locator: &str) -> Result<OpendapHandle, SourceError> {
        let dds = parse_dds(&fetch_text(&self.client, self.credentials.as_ref(), &dds_url(locator))?)?;
        let das = parse_das(&fetch_text(&self.client, self.credentials.as_ref(), &das_url(locator))?);

        logging::debug(Component::OpenDap, None, &format!("opened {}", locator));

        Ok(OpendapHandle {
            client: self.client.clone(),
            credentials: self.credentials.clone(),
            url: locator.to_string(),
            dds,
            das,
        })
    }
}

/// An opened DAP2 dataset: its structure and attributes, plus the URL for
/// value requests. Dropping it closes it.
pub struct OpendapHandle {
    client: reqwest::blocking::Client,
    credentials: Option<Credentials>,
    url: String,
    dds: Dds,
    das: Das,
}

impl OpendapHandle {
    fn fetch_values(&self, constraint: &str, variable: &str) -> Result<Vec<f64>, SourceError> {
        let url = ascii_url(&self.url, constraint);
        let text = fetch_text(&self.client, self.credentials.as_ref(), &url)?;
        parse_ascii(&text, variable)
    }
}

impl GridHandle for OpendapHandle {
    fn has_variable(&self, name: &str) -> bool {
        self.dds.dimensions(name).is_some()
    }

    fn axis(&self, name: &str) -> Result<Vec<f64>, SourceError> {
        if !self.has_variable(name) {
            return Err(SourceError::MissingAxis(name.to_string()));
        }
        let packing = Packing::from_das(&self.das, name);
        let raw = self.fetch_values(&encode_constraint(name), name)?;
        Ok(raw.into_iter().map(|v| packing.decode(v)).collect())
    }

    fn time_axis(&self, name: &str) -> Result<Vec<NaiveDateTime>, SourceError> {
        let units = self
            .das
            .get(name, "units")
            .ok_or_else(|| SourceError::Parse(format!("time axis '{}' has no units", name)))?;
        let units = TimeUnits::parse(units)?;

        let raw = self.axis(name)?;
        raw.into_iter()
            .map(|v| {
                units
                    .decode(v)
                    .ok_or_else(|| SourceError::Parse(format!("undecodable time value {}", v)))
            })
            .collect()
    }

    fn read_point(&self, variable: &str, selection: &[(&str, usize)]) -> Result<f64, SourceError> {
        let dims = self
            .dds
            .dimensions(variable)
            .ok_or_else(|| SourceError::MissingVariable(variable.to_string()))?;
        let constraint = build_constraint(variable, dims, selection)?;
        let values = self.fetch_values(&constraint, variable)?;

        let raw = values.first().copied().ok_or_else(|| {
            SourceError::Parse(format!("no value returned for '{}'", variable))
        })?;
        Ok(Packing::from_das(&self.das, variable).decode(raw))
    }
}

impl Drop for OpendapHandle {
    fn drop(&mut self) {
        logging::debug(Component::OpenDap, None, &format!("closed {}", self.url));
    }
}

// ============================================================================
// Requests
// ============================================================================

pub fn dds_url(base: &str) -> String {
    format!("{}.dds", base)
}

pub fn das_url(base: &str) -> String {
    format!("{}.das", base)
}

/// `constraint` must already be percent-encoded.
pub fn ascii_url(base: &str, constraint: &str) -> String {
    format!("{}.ascii?{}", base, constraint)
}

fn fetch_text(
    client: &reqwest::blocking::Client,
    credentials: Option<&Credentials>,
    url: &str,
) -> Result<String, SourceError> {
    let mut request = client.get(url);
    if let Some(c) = credentials {
        request = request.basic_auth(&c.username, Some(&c.password));
    }

    let response = request.send()?;
    let status = response.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(SourceError::Unauthorized {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        return Err(SourceError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    Ok(response.text()?)
}

/// Builds the hyperslab constraint selecting one element of `variable`.
///
/// `dims` is the variable's declared dimension list; dimensions not named in
/// `selection` are pinned to 0.
pub fn build_constraint(
    variable: &str,
    dims: &[Dimension],
    selection: &[(&str, usize)],
) -> Result<String, SourceError> {
    let mut constraint = variable.to_string();

    for dim in dims {
        let index = selection
            .iter()
            .find(|(name, _)| *name == dim.name)
            .map(|(_, i)| *i)
            .unwrap_or(0);

        if index >= dim.size {
            return Err(SourceError::IndexOutOfRange {
                dimension: dim.name.clone(),
                index,
                size: dim.size,
            });
        }
        constraint.push_str(&format!("[{}:{}]", index, index));
    }

    Ok(encode_constraint(&constraint))
}

/// Percent-encodes the characters servers reject in a raw query string.
pub fn encode_constraint(constraint: &str) -> String {
    let mut encoded = String::with_capacity(constraint.len());
    for c in constraint.chars() {
        match c {
            '[' => encoded.push_str("%5B"),
            ']' => encoded.push_str("%5D"),
            ':' => encoded.push_str("%3A"),
            ' ' => encoded.push_str("%20"),
            _ => encoded.push(c),
        }
    }
    encoded
}

// ============================================================================
// DDS
// ============================================================================

/// One named dimension of a DAP2 array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub size: usize,
}

/// Variable name → declared dimensions, from a DDS response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dds {
    variables: HashMap<String, Vec<Dimension>>,
}

impl Dds {
    pub fn dimensions(&self, variable: &str) -> Option<&[Dimension]> {
        self.variables.get(variable).map(Vec::as_slice)
    }
}

/// Parses array declarations such as `Float32 sst[time = 14245][lat = 720][lon = 1440];`.
///
/// Inside a Grid the ARRAY declaration precedes the MAPS, so the first
/// declaration of a name wins.
pub fn parse_dds(text: &str) -> Result<Dds, SourceError> {
    let trimmed = text.trim_start();
    if !trimmed.starts_with("Dataset") {
        return Err(SourceError::Parse("response is not a DDS".to_string()));
    }

    let mut dds = Dds::default();

    for line in text.lines() {
        let line = line.trim().trim_end_matches(';');
        let Some((_type_name, declaration)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let declaration = declaration.trim();
        let Some(open) = declaration.find('[') else {
            continue;
        };

        let name = declaration[..open].trim().to_string();
        let mut dims = Vec::new();
        for group in declaration[open..].split('[').filter(|g| !g.is_empty()) {
            let inner = group.trim_end().trim_end_matches(']');
            let (dim_name, size) = match inner.split_once('=') {
                Some((n, s)) => (n.trim().to_string(), s.trim()),
                None => (String::new(), inner.trim()),
            };
            let size = size
                .parse::<usize>()
                .map_err(|_| SourceError::Parse(format!("bad dimension size in '{}'", line)))?;
            dims.push(Dimension { name: dim_name, size });
        }

        dds.variables.entry(name).or_insert(dims);
    }

    Ok(dds)
}

// ============================================================================
// DAS
// ============================================================================

/// Container name → attribute name → raw attribute value, from a DAS response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Das {
    containers: HashMap<String, HashMap<String, String>>,
}

impl Das {
    pub fn get(&self, container: &str, attribute: &str) -> Option<&str> {
        self.containers
            .get(container)
            .and_then(|attrs| attrs.get(attribute))
            .map(String::as_str)
    }

    /// First element of a numeric attribute.
    pub fn number(&self, container: &str, attribute: &str) -> Option<f64> {
        self.get(container, attribute)
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse().ok())
    }
}

/// Parses a DAS. Attributes are filed under their innermost container.
pub fn parse_das(text: &str) -> Das {
    let mut das = Das::default();
    let mut stack: Vec<String> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_suffix('{') {
            stack.push(name.trim().to_string());
            continue;
        }
        if line.starts_with('}') {
            stack.pop();
            continue;
        }

        let Some(body) = line.strip_suffix(';') else {
            continue;
        };
        let Some((_type_name, rest)) = body.trim().split_once(char::is_whitespace) else {
            continue;
        };
        let Some((name, value)) = rest.trim_start().split_once(char::is_whitespace) else {
            continue;
        };
        let Some(container) = stack.last() else {
            continue;
        };

        das.containers
            .entry(container.clone())
            .or_default()
            .insert(name.to_string(), value.trim().trim_matches('"').to_string());
    }

    das
}

/// Packing and fill attributes of one variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Packing {
    pub scale_factor: f64,
    pub add_offset: f64,
    pub fill_value: Option<f64>,
    pub missing_value: Option<f64>,
}

impl Packing {
    pub fn from_das(das: &Das, variable: &str) -> Self {
        Self {
            scale_factor: das.number(variable, "scale_factor").unwrap_or(1.0),
            add_offset: das.number(variable, "add_offset").unwrap_or(0.0),
            fill_value: das.number(variable, "_FillValue"),
            missing_value: das.number(variable, "missing_value"),
        }
    }

    /// Unpacks a raw value; fill and missing markers become NaN.
    pub fn decode(&self, raw: f64) -> f64 {
        let is_marker = |marker: Option<f64>| {
            marker.is_some_and(|m| raw == m || (raw - m).abs() <= m.abs() * 1e-6)
        };
        if raw.is_nan() || is_marker(self.fill_value) || is_marker(self.missing_value) {
            return f64::NAN;
        }
        raw * self.scale_factor + self.add_offset
    }
}

// ============================================================================
// ASCII
// ============================================================================

/// Extracts the values of `variable` from a DAP2 ASCII response.
///
/// Handles the THREDDS layout (`sst.sst[1][1][1]` header, then
/// `[0][0], 22.83` rows) and the Hyrax layout (`sst.sst[0][0], 22.83`).
/// For a Grid the ARRAY component `var.var` is matched; its MAPS are not.
pub fn parse_ascii(text: &str, variable: &str) -> Result<Vec<f64>, SourceError> {
    let body = text
        .split_once("\n---")
        .map(|(_, rest)| rest.split_once('\n').map(|(_, r)| r).unwrap_or(""))
        .unwrap_or(text);

    let grid_name = format!("{}.{}", variable, variable);
    let mut lines = body.lines().peekable();

    while let Some(line) = lines.next() {
        let line = line.trim();
        let rest = match strip_name(line, &grid_name).or_else(|| strip_name(line, variable)) {
            Some(rest) => rest,
            None => continue,
        };

        let mut values = data_values(rest).unwrap_or_default();
        while let Some(next) = lines.peek() {
            match data_values(next.trim()) {
                Some(mut row) => {
                    values.append(&mut row);
                    lines.next();
                }
                None => break,
            }
        }

        if values.is_empty() {
            return Err(SourceError::Parse(format!("no values for '{}' in response", variable)));
        }
        return Ok(values);
    }

    Err(SourceError::Parse(format!("'{}' not found in response", variable)))
}

/// The remainder of `line` if it starts with `name` followed by an index,
/// a comma, or nothing.
fn strip_name<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?;
    match rest.chars().next() {
        None | Some('[') | Some(',') => Some(rest),
        _ => None,
    }
}

/// Parses a row of comma-separated numbers, optionally prefixed by index
/// groups (`[0][3], 1.5`). Returns `None` for anything that is not a data
/// row, and `Some(empty)` for a bare shape such as `[1][1][1]`.
fn data_values(line: &str) -> Option<Vec<f64>> {
    if line.is_empty() {
        return None;
    }

    let mut rest = line;
    while let Some(after) = rest.strip_prefix('[') {
        let close = after.find(']')?;
        rest = &after[close + 1..];
    }
    let rest = rest.trim_start().trim_start_matches(',').trim();
    if rest.is_empty() {
        return if line.starts_with('[') { Some(Vec::new()) } else { None };
    }

    rest.split(',').map(|v| v.trim().parse::<f64>().ok()).collect()
}

// ============================================================================
// Tests
// ============================================================================
