//! Multi-format backup codec
//!
//! Serializes a full snapshot of features, tags, and repositories to JSON,
//! XML, or CSV text and parses each format back for restore. Restore upserts
//! by id through the same put path normal saves use, so importing a backup is
//! indistinguishable from bulk manual entry. Applications and their links are
//! not part of the snapshot.
//!
//! The CSV and XML readers are small hand-rolled scanners, kept independent
//! of any parser crate so the round-trip contract is verifiable on its own.

use crate::db::{now_millis, Database, DbError, Feature, Repository, Tag};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;

/// Format tag written into JSON and XML backups.
pub const BACKUP_VERSION: &str = "1.0";

/// One point-in-time aggregate of everything the backup covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub repositories: Vec<Repository>,
    /// Capture time, epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    BACKUP_VERSION.to_string()
}

/// The three interchangeable backup formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupFormat {
    Json,
    Xml,
    Csv,
}

impl BackupFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Csv => "csv",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "xml" => Some(Self::Xml),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Infer the format from a file extension.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_name)
    }
}

/// Error type for backup parsing and restore
#[derive(Debug)]
pub enum BackupError {
    Json(String),
    Csv(String),
    Xml(String),
    UnknownFormat(String),
    Io(std::io::Error),
    Store(DbError),
}

impl std::fmt::Display for BackupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupError::Json(msg) => write!(f, "Invalid JSON backup: {}", msg),
            BackupError::Csv(msg) => write!(f, "Invalid CSV backup: {}", msg),
            BackupError::Xml(msg) => write!(f, "Invalid XML backup: {}", msg),
            BackupError::UnknownFormat(s) => {
                write!(f, "Unknown backup format '{}' (expected json, xml, or csv)", s)
            }
            BackupError::Io(e) => write!(f, "IO error: {}", e),
            BackupError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BackupError {}

impl From<DbError> for BackupError {
    fn from(e: DbError) -> Self {
        BackupError::Store(e)
    }
}

impl From<std::io::Error> for BackupError {
    fn from(e: std::io::Error) -> Self {
        BackupError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

/// Counts of records written by a restore.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportSummary {
    pub features: usize,
    pub tags: usize,
    pub repositories: usize,
}

// ============================================================================
// Export / Import
// ============================================================================

/// Read all three tables into a snapshot stamped with the current time.
pub fn export_snapshot(db: &Database) -> Result<Snapshot> {
    Ok(Snapshot {
        features: db.list_features()?,
        tags: db.list_tags()?,
        repositories: db.list_repositories()?,
        timestamp: now_millis(),
        version: BACKUP_VERSION.to_string(),
    })
}

/// Render a snapshot in the requested format.
pub fn render(snapshot: &Snapshot, format: BackupFormat) -> String {
    match format {
        BackupFormat::Json => to_json(snapshot),
        BackupFormat::Xml => to_xml(snapshot),
        BackupFormat::Csv => to_csv(snapshot),
    }
}

/// Parse backup text and upsert every record into the store.
///
/// The parse runs to completion before anything is written, so a malformed
/// backup never leaves a partial import behind. Existing records with
/// matching ids are overwritten; nothing is wiped first. Tags are restored
/// exactly as recorded, without case-insensitive de-duplication.
pub fn import_snapshot(db: &Database, text: &str, format: BackupFormat) -> Result<ImportSummary> {
    let snapshot = match format {
        BackupFormat::Json => parse_json(text)?,
        BackupFormat::Xml => parse_xml(text)?,
        BackupFormat::Csv => parse_csv(text)?,
    };

    for feature in &snapshot.features {
        db.put_feature(feature)?;
    }
    for tag in &snapshot.tags {
        db.put_tag(tag)?;
    }
    for repository in &snapshot.repositories {
        db.put_repository(repository)?;
    }

    Ok(ImportSummary {
        features: snapshot.features.len(),
        tags: snapshot.tags.len(),
        repositories: snapshot.repositories.len(),
    })
}

/// Default filename for a fresh backup.
pub fn backup_filename(format: BackupFormat) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("wishlist_backup_{}.{}", timestamp, format.as_str())
}

// ============================================================================
// Last-backup bookkeeping
// ============================================================================

fn last_backup_file() -> PathBuf {
    Database::db_path().with_file_name("last-backup")
}

/// Remember that a backup was just written (epoch ms in a sidecar file).
pub fn record_backup_time() -> std::io::Result<()> {
    let path = last_backup_file();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, now_millis().to_string())
}

/// When the last backup was recorded, if ever.
pub fn last_backup_time() -> Option<i64> {
    let text = std::fs::read_to_string(last_backup_file()).ok()?;
    text.trim().parse().ok()
}

/// Whether the last backup is older than the reminder window (or missing).
pub fn backup_is_stale(reminder_days: u32) -> bool {
    match last_backup_time() {
        Some(at) => now_millis() - at > i64::from(reminder_days) * 24 * 60 * 60 * 1000,
        None => true,
    }
}

// ============================================================================
// JSON
// ============================================================================

pub fn to_json(snapshot: &Snapshot) -> String {
    serde_json::to_string_pretty(snapshot).unwrap_or_default()
}

pub fn parse_json(text: &str) -> Result<Snapshot> {
    serde_json::from_str(text).map_err(|e| BackupError::Json(e.to_string()))
}

// ============================================================================
// CSV
// ============================================================================

const CSV_FEATURE_COLUMNS: usize = 6;
const CSV_TAG_COLUMNS: usize = 3;
const CSV_REPOSITORY_COLUMNS: usize = 6;

/// Always-quoted CSV field: wrapped in double quotes, inner quotes doubled.
fn csv_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quote only when the value needs it (delimiter, quote, or newline).
fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        csv_quote(s)
    } else {
        s.to_string()
    }
}

/// Three sections, each a section header line, a column header line, and one
/// row per record. Feature tag lists are joined with `;` in a single quoted
/// field. Snapshot timestamp and version are not carried by this format.
pub fn to_csv(snapshot: &Snapshot) -> String {
    let mut csv = String::new();

    csv.push_str("FEATURES\n");
    csv.push_str("ID,Title,Description,Tags,Created At,Updated At\n");
    for feature in &snapshot.features {
        let tags = feature.tags.join(";");
        writeln!(
            csv,
            "{},{},{},{},{},{}",
            csv_field(&feature.id),
            csv_quote(&feature.title),
            csv_quote(&feature.description),
            csv_quote(&tags),
            feature.created_at,
            feature.updated_at
        )
        .unwrap();
    }

    csv.push('\n');
    csv.push_str("TAGS\n");
    csv.push_str("ID,Name,Color\n");
    for tag in &snapshot.tags {
        writeln!(
            csv,
            "{},{},{}",
            csv_field(&tag.id),
            csv_quote(&tag.name),
            csv_field(&tag.color)
        )
        .unwrap();
    }

    csv.push('\n');
    csv.push_str("REPOSITORIES\n");
    csv.push_str("ID,Name,Owner,URL,Created At,Updated At\n");
    for repo in &snapshot.repositories {
        writeln!(
            csv,
            "{},{},{},{},{},{}",
            csv_field(&repo.id),
            csv_quote(&repo.name),
            csv_quote(&repo.owner),
            csv_field(&repo.url),
            repo.created_at,
            repo.updated_at
        )
        .unwrap();
    }

    csv
}

/// Quote-aware record scanner: tracks in-quote state char by char. A doubled
/// quote inside quotes emits one literal quote; a comma or newline inside
/// quotes is data, not a separator.
fn scan_csv_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => row.push(std::mem::take(&mut field)),
                '\r' => {} // bare CR is ignored; LF terminates the record
                '\n' => {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                _ => field.push(c),
            }
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

/// Parse a number cell; malformed or empty values become 0 instead of
/// failing the whole import.
fn parse_millis(cell: &str) -> i64 {
    cell.trim().parse().unwrap_or(0)
}

pub fn parse_csv(text: &str) -> Result<Snapshot> {
    #[derive(PartialEq)]
    enum Section {
        None,
        Features,
        Tags,
        Repositories,
    }

    let mut features = Vec::new();
    let mut tags = Vec::new();
    let mut repositories = Vec::new();

    let mut section = Section::None;
    let mut skip_header = false;

    for (index, row) in scan_csv_rows(text).iter().enumerate() {
        let line = index + 1;

        // Blank separator rows
        if row.len() == 1 && row[0].trim().is_empty() {
            continue;
        }

        // Section header rows
        if row.len() == 1 {
            section = match row[0].trim() {
                "FEATURES" => Section::Features,
                "TAGS" => Section::Tags,
                "REPOSITORIES" => Section::Repositories,
                other => {
                    return Err(BackupError::Csv(format!(
                        "row {}: unknown section header '{}'",
                        line, other
                    )))
                }
            };
            skip_header = true;
            continue;
        }

        // Column header line directly after a section header
        if skip_header {
            skip_header = false;
            continue;
        }

        match section {
            Section::None => {
                return Err(BackupError::Csv(format!(
                    "row {}: data before any section header",
                    line
                )))
            }
            Section::Features => {
                if row.len() < CSV_FEATURE_COLUMNS {
                    return Err(BackupError::Csv(format!(
                        "row {}: feature row has {} columns, expected {}",
                        line,
                        row.len(),
                        CSV_FEATURE_COLUMNS
                    )));
                }
                features.push(Feature {
                    id: row[0].clone(),
                    title: row[1].clone(),
                    description: row[2].clone(),
                    tags: row[3]
                        .split(';')
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect(),
                    created_at: parse_millis(&row[4]),
                    updated_at: parse_millis(&row[5]),
                });
            }
            Section::Tags => {
                if row.len() < CSV_TAG_COLUMNS {
                    return Err(BackupError::Csv(format!(
                        "row {}: tag row has {} columns, expected {}",
                        line,
                        row.len(),
                        CSV_TAG_COLUMNS
                    )));
                }
                tags.push(Tag {
                    id: row[0].clone(),
                    name: row[1].clone(),
                    color: row[2].clone(),
                });
            }
            Section::Repositories => {
                if row.len() < CSV_REPOSITORY_COLUMNS {
                    return Err(BackupError::Csv(format!(
                        "row {}: repository row has {} columns, expected {}",
                        line,
                        row.len(),
                        CSV_REPOSITORY_COLUMNS
                    )));
                }
                repositories.push(Repository {
                    id: row[0].clone(),
                    name: row[1].clone(),
                    owner: row[2].clone(),
                    url: row[3].clone(),
                    created_at: parse_millis(&row[4]),
                    updated_at: parse_millis(&row[5]),
                });
            }
        }
    }

    Ok(Snapshot {
        features,
        tags,
        repositories,
        timestamp: now_millis(),
        version: BACKUP_VERSION.to_string(),
    })
}

// ============================================================================
// XML
// ============================================================================

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

// &amp; must come last so escaped escapes stay escaped
fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub fn to_xml(snapshot: &Snapshot) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    writeln!(
        xml,
        "<backup version=\"{}\" timestamp=\"{}\">",
        xml_escape(&snapshot.version),
        snapshot.timestamp
    )
    .unwrap();

    xml.push_str("  <features>\n");
    for feature in &snapshot.features {
        xml.push_str("    <feature>\n");
        writeln!(xml, "      <id>{}</id>", xml_escape(&feature.id)).unwrap();
        writeln!(xml, "      <title>{}</title>", xml_escape(&feature.title)).unwrap();
        writeln!(
            xml,
            "      <description>{}</description>",
            xml_escape(&feature.description)
        )
        .unwrap();
        xml.push_str("      <tags>\n");
        for tag in &feature.tags {
            writeln!(xml, "        <tag>{}</tag>", xml_escape(tag)).unwrap();
        }
        xml.push_str("      </tags>\n");
        writeln!(xml, "      <createdAt>{}</createdAt>", feature.created_at).unwrap();
        writeln!(xml, "      <updatedAt>{}</updatedAt>", feature.updated_at).unwrap();
        xml.push_str("    </feature>\n");
    }
    xml.push_str("  </features>\n");

    xml.push_str("  <tags>\n");
    for tag in &snapshot.tags {
        xml.push_str("    <tag>\n");
        writeln!(xml, "      <id>{}</id>", xml_escape(&tag.id)).unwrap();
        writeln!(xml, "      <name>{}</name>", xml_escape(&tag.name)).unwrap();
        writeln!(xml, "      <color>{}</color>", xml_escape(&tag.color)).unwrap();
        xml.push_str("    </tag>\n");
    }
    xml.push_str("  </tags>\n");

    xml.push_str("  <repositories>\n");
    for repo in &snapshot.repositories {
        xml.push_str("    <repository>\n");
        writeln!(xml, "      <id>{}</id>", xml_escape(&repo.id)).unwrap();
        writeln!(xml, "      <name>{}</name>", xml_escape(&repo.name)).unwrap();
        writeln!(xml, "      <owner>{}</owner>", xml_escape(&repo.owner)).unwrap();
        writeln!(xml, "      <url>{}</url>", xml_escape(&repo.url)).unwrap();
        writeln!(xml, "      <createdAt>{}</createdAt>", repo.created_at).unwrap();
        writeln!(xml, "      <updatedAt>{}</updatedAt>", repo.updated_at).unwrap();
        xml.push_str("    </repository>\n");
    }
    xml.push_str("  </repositories>\n");

    xml.push_str("</backup>");
    xml
}

/// Find `<tag ...>inner</tag>` at or after `from`. Returns the attribute
/// string, the inner text, and the index just past the closing tag. A match
/// like `<tags>` while searching for `<tag>` is skipped.
fn next_element<'a>(text: &'a str, tag: &str, from: usize) -> Option<(&'a str, &'a str, usize)> {
    let open_pat = format!("<{}", tag);
    let close_pat = format!("</{}>", tag);
    let mut search = from;

    loop {
        let start = search + text.get(search..)?.find(&open_pat)?;
        let after_name = start + open_pat.len();
        let next_char = text.get(after_name..)?.chars().next()?;
        if next_char != '>' && !next_char.is_whitespace() {
            // Longer tag name (e.g. <tags> while scanning for <tag>)
            search = after_name;
            continue;
        }
        let open_end = after_name + text.get(after_name..)?.find('>')?;
        let attrs = text.get(after_name..open_end)?.trim();
        let inner_start = open_end + 1;
        let close = inner_start + text.get(inner_start..)?.find(&close_pat)?;
        let inner = text.get(inner_start..close)?;
        return Some((attrs, inner, close + close_pat.len()));
    }
}

/// Unescaped text content of the first `<tag>` leaf inside `scope`.
fn element_text(scope: &str, tag: &str) -> Option<String> {
    next_element(scope, tag, 0).map(|(_, inner, _)| xml_unescape(inner))
}

/// Value of a `name="value"` pair inside an attribute string.
fn attr_value<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let pat = format!("{}=\"", name);
    let start = attrs.find(&pat)? + pat.len();
    let len = attrs.get(start..)?.find('"')?;
    attrs.get(start..start + len)
}

pub fn parse_xml(text: &str) -> Result<Snapshot> {
    let (root_attrs, root_inner, _) = next_element(text, "backup", 0)
        .ok_or_else(|| BackupError::Xml("missing <backup> root element".to_string()))?;

    let mut features = Vec::new();
    let mut tags = Vec::new();
    let mut repositories = Vec::new();

    // Sections are read in document order so the top-level <tags> section is
    // never confused with a feature's nested tag list.
    let mut cursor = 0;

    if let Some((_, section, end)) = next_element(root_inner, "features", cursor) {
        let mut at = 0;
        while let Some((_, feature, next)) = next_element(section, "feature", at) {
            let mut tag_names = Vec::new();
            if let Some((_, tag_list, _)) = next_element(feature, "tags", 0) {
                let mut t = 0;
                while let Some((_, name, next_t)) = next_element(tag_list, "tag", t) {
                    tag_names.push(xml_unescape(name));
                    t = next_t;
                }
            }
            features.push(Feature {
                id: element_text(feature, "id").unwrap_or_default(),
                title: element_text(feature, "title").unwrap_or_default(),
                description: element_text(feature, "description").unwrap_or_default(),
                tags: tag_names,
                created_at: parse_millis(&element_text(feature, "createdAt").unwrap_or_default()),
                updated_at: parse_millis(&element_text(feature, "updatedAt").unwrap_or_default()),
            });
            at = next;
        }
        cursor = end;
    }

    if let Some((_, section, end)) = next_element(root_inner, "tags", cursor) {
        let mut at = 0;
        while let Some((_, tag, next)) = next_element(section, "tag", at) {
            tags.push(Tag {
                id: element_text(tag, "id").unwrap_or_default(),
                name: element_text(tag, "name").unwrap_or_default(),
                color: element_text(tag, "color").unwrap_or_default(),
            });
            at = next;
        }
        cursor = end;
    }

    if let Some((_, section, _)) = next_element(root_inner, "repositories", cursor) {
        let mut at = 0;
        while let Some((_, repo, next)) = next_element(section, "repository", at) {
            repositories.push(Repository {
                id: element_text(repo, "id").unwrap_or_default(),
                name: element_text(repo, "name").unwrap_or_default(),
                owner: element_text(repo, "owner").unwrap_or_default(),
                url: element_text(repo, "url").unwrap_or_default(),
                created_at: parse_millis(&element_text(repo, "createdAt").unwrap_or_default()),
                updated_at: parse_millis(&element_text(repo, "updatedAt").unwrap_or_default()),
            });
            at = next;
        }
    }

    let timestamp = match attr_value(root_attrs, "timestamp") {
        Some(raw) => parse_millis(raw),
        None => now_millis(),
    };
    let version = attr_value(root_attrs, "version")
        .map(xml_unescape)
        .unwrap_or_else(default_version);

    Ok(Snapshot {
        features,
        tags,
        repositories,
        timestamp,
        version,
    })
}
