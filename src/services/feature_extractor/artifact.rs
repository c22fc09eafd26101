//! 结构化产物读取
//!
//! 分析器输出为一个目录（其下若干 `*.json`）或单个 `.json` 文件，
//! 每个文档是一条类型记录或记录数组。

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::services::doc_generator::PipelineError;

/// 类型记录（类、接口、枚举……）
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TypeRecord {
    #[serde(alias = "className", alias = "typeName")]
    pub name: String,
    #[serde(alias = "packageName")]
    pub package: String,
    #[serde(alias = "type")]
    pub kind: String,
    pub signature: String,
    pub modifiers: Vec<String>,
    #[serde(alias = "superClass", alias = "superclass")]
    pub extends: Option<String>,
    #[serde(alias = "interfaces")]
    pub implements: Vec<String>,
    pub fields: Vec<FieldRecord>,
    pub methods: Vec<MethodRecord>,
    #[serde(alias = "imports")]
    pub dependencies: Vec<String>,
    #[serde(alias = "filePath", alias = "path")]
    pub file: Option<String>,
    #[serde(alias = "javadoc", alias = "comment")]
    pub doc: Option<String>,
}

impl TypeRecord {
    /// 全限定名
    pub fn qualified_name(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }

    pub fn kind_label(&self) -> &str {
        if self.kind.is_empty() {
            "class"
        } else {
            &self.kind
        }
    }

    pub fn is_public(&self) -> bool {
        self.modifiers.iter().any(|m| m == "public")
    }

    /// 有签名用签名，否则拼一个
    pub fn display_signature(&self) -> String {
        if !self.signature.trim().is_empty() {
            return self.signature.trim().to_string();
        }
        let mut parts: Vec<String> = self.modifiers.clone();
        parts.push(self.kind_label().to_string());
        parts.push(self.name.clone());
        if let Some(parent) = &self.extends {
            parts.push(format!("extends {}", parent));
        }
        if !self.implements.is_empty() {
            parts.push(format!("implements {}", self.implements.join(", ")));
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldRecord {
    pub name: String,
    #[serde(rename = "type", alias = "fieldType")]
    pub type_name: String,
    pub modifiers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MethodRecord {
    #[serde(alias = "methodName")]
    pub name: String,
    pub signature: String,
    pub modifiers: Vec<String>,
    #[serde(alias = "returnType")]
    pub return_type: Option<String>,
    #[serde(alias = "params")]
    pub parameters: Vec<String>,
    #[serde(alias = "exceptions")]
    pub throws: Vec<String>,
    #[serde(alias = "javadoc", alias = "comment")]
    pub doc: Option<String>,
}

impl MethodRecord {
    pub fn is_public(&self) -> bool {
        self.modifiers.iter().any(|m| m == "public")
    }

    pub fn is_entry_point(&self) -> bool {
        self.name == "main" && self.modifiers.iter().any(|m| m == "static")
    }

    pub fn display_signature(&self) -> String {
        if !self.signature.trim().is_empty() {
            return self.signature.trim().to_string();
        }
        let ret = self.return_type.as_deref().unwrap_or("void");
        format!("{} {}({})", ret, self.name, self.parameters.join(", "))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArtifactDocument {
    Many(Vec<TypeRecord>),
    One(TypeRecord),
}

/// 解析后的项目结构模型
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JavaArtifact {
    pub records: Vec<TypeRecord>,
}

impl JavaArtifact {
    pub fn new(records: Vec<TypeRecord>) -> Self {
        Self { records }
    }

    /// 包名 -> 该包的类型（包名为空记为 `(default)`）
    pub fn packages(&self) -> BTreeMap<&str, Vec<&TypeRecord>> {
        let mut packages: BTreeMap<&str, Vec<&TypeRecord>> = BTreeMap::new();
        for record in &self.records {
            let package = if record.package.is_empty() {
                "(default)"
            } else {
                record.package.as_str()
            };
            packages.entry(package).or_default().push(record);
        }
        packages
    }

    /// 按类型种类计数
    pub fn kind_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.kind_label()).or_insert(0) += 1;
        }
        counts
    }

    fn internal_names(&self) -> BTreeSet<String> {
        self.records.iter().map(TypeRecord::qualified_name).collect()
    }

    fn is_internal(&self, dependency: &str, internal: &BTreeSet<String>) -> bool {
        internal.contains(dependency)
            || self
                .records
                .iter()
                .any(|r| !r.package.is_empty() && dependency.starts_with(&format!("{}.", r.package)))
    }

    /// 项目外部的依赖包（JDK 包除外）
    pub fn external_packages(&self) -> BTreeSet<String> {
        self.dependency_packages()
            .into_iter()
            .filter(|p| !is_jdk_package(p))
            .collect()
    }

    /// 用到的 JDK 包
    pub fn jdk_packages(&self) -> BTreeSet<String> {
        self.dependency_packages()
            .into_iter()
            .filter(|p| is_jdk_package(p))
            .collect()
    }

    fn dependency_packages(&self) -> BTreeSet<String> {
        let internal = self.internal_names();
        self.records
            .iter()
            .flat_map(|r| r.dependencies.iter())
            .filter(|d| !self.is_internal(d, &internal))
            .map(|d| package_of(d))
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// 被项目内其他类型依赖最多的类型（降序）
    pub fn dependency_hotspots(&self, limit: usize) -> Vec<(String, usize)> {
        let internal = self.internal_names();
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for record in &self.records {
            let own = record.qualified_name();
            let targets: BTreeSet<&str> = record
                .dependencies
                .iter()
                .map(String::as_str)
                .filter(|d| internal.contains(*d) && *d != own)
                .collect();
            for target in targets {
                *counts.entry(target.to_string()).or_insert(0) += 1;
            }
        }

        let mut hotspots: Vec<(String, usize)> = counts.into_iter().collect();
        hotspots.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hotspots.truncate(limit);
        hotspots
    }
}

fn is_jdk_package(package: &str) -> bool {
    package == "java" || package == "javax" || package.starts_with("java.") || package.starts_with("javax.")
}

/// `org.slf4j.Logger` -> `org.slf4j`；`org.slf4j.*` -> `org.slf4j`
fn package_of(dependency: &str) -> String {
    let trimmed = dependency.trim().trim_end_matches(".*");
    let segments: Vec<&str> = trimmed.split('.').collect();
    let package_len = segments
        .iter()
        .position(|s| s.chars().next().map_or(false, char::is_uppercase))
        .unwrap_or(segments.len());
    segments[..package_len].join(".")
}

fn unreadable(path: &Path, reason: impl Into<String>) -> PipelineError {
    PipelineError::ArtifactUnreadable {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// 列出产物中的 JSON 文档（按路径排序）
fn artifact_documents(location: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    if !location.exists() {
        return Err(unreadable(
            location,
            "artifact not found; the analyzer did not write output at the expected location",
        ));
    }

    if location.is_file() {
        return Ok(vec![location.to_path_buf()]);
    }

    let pattern = format!(
        "{}/**/*.json",
        glob::Pattern::escape(&location.to_string_lossy())
    );
    let entries = glob::glob(&pattern).map_err(|e| unreadable(location, e.to_string()))?;

    let mut documents = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => documents.push(path),
            Ok(_) => {}
            Err(e) => return Err(unreadable(location, e.to_string())),
        }
    }
    documents.sort();

    if documents.is_empty() {
        return Err(unreadable(location, "no JSON documents in artifact directory"));
    }
    Ok(documents)
}

/// 读取并解析整个产物
pub fn read_artifact(location: &Path) -> Result<JavaArtifact, PipelineError> {
    let mut records = Vec::new();

    for document in artifact_documents(location)? {
        let content = std::fs::read_to_string(&document)
            .map_err(|e| unreadable(&document, e.to_string()))?;
        let parsed: ArtifactDocument = serde_json::from_str(&content)
            .map_err(|e| unreadable(&document, format!("malformed document: {}", e)))?;

        let batch = match parsed {
            ArtifactDocument::Many(batch) => batch,
            ArtifactDocument::One(record) => vec![record],
        };
        if let Some(nameless) = batch.iter().position(|r| r.name.trim().is_empty()) {
            return Err(unreadable(
                &document,
                format!("malformed document: type record #{} has no name", nameless),
            ));
        }

        debug!("Read {} type records from {}", batch.len(), document.display());
        records.extend(batch);
    }

    Ok(JavaArtifact::new(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn record(package: &str, name: &str, deps: &[&str]) -> TypeRecord {
        TypeRecord {
            name: name.to_string(),
            package: package.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_reads_directory_of_documents() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"[{"name": "Order", "packageName": "shop.model", "kind": "class"},
                {"name": "Repo", "package": "shop.data", "type": "interface"}]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("nested/b.json"),
            r#"{"className": "App", "package": "shop", "methods": [{"name": "main", "modifiers": ["public", "static"]}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let artifact = read_artifact(dir.path()).unwrap();
        let names: Vec<&str> = artifact.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Order", "Repo", "App"]);
        assert_eq!(artifact.records[1].kind, "interface");
        assert!(artifact.records[2].methods[0].is_entry_point());
    }

    #[test]
    fn test_missing_location_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("demo");
        let err = read_artifact(&missing).unwrap_err();
        match err {
            PipelineError::ArtifactUnreadable { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_artifact(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "artifact_unreadable");
    }

    #[test]
    fn test_malformed_document_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.json");
        fs::write(&file, "{not json").unwrap();

        match read_artifact(dir.path()).unwrap_err() {
            PipelineError::ArtifactUnreadable { path, reason } => {
                assert_eq!(path, file);
                assert!(reason.starts_with("malformed document"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_record_without_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("one.json");
        fs::write(&file, r#"{"package": "shop"}"#).unwrap();
        assert_eq!(read_artifact(&file).unwrap_err().kind(), "artifact_unreadable");
    }

    #[test]
    fn test_dependency_classification() {
        let artifact = JavaArtifact::new(vec![
            record("shop", "App", &["shop.data.Repo", "org.slf4j.Logger", "java.util.List"]),
            record("shop.data", "Repo", &["javax.sql.DataSource", "com.zaxxer.hikari.*"]),
            record("shop.web", "Api", &["shop.data.Repo"]),
        ]);

        assert_eq!(
            artifact.external_packages().into_iter().collect::<Vec<_>>(),
            vec!["com.zaxxer.hikari", "org.slf4j"]
        );
        assert_eq!(
            artifact.jdk_packages().into_iter().collect::<Vec<_>>(),
            vec!["java.util", "javax.sql"]
        );
        assert_eq!(
            artifact.dependency_hotspots(5),
            vec![("shop.data.Repo".to_string(), 2)]
        );
    }
}
