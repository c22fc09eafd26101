//! 各内容模块的结构化事实

use super::artifact::{JavaArtifact, TypeRecord};
use super::key_files::{KeyFile, KeyFileKind};
use crate::services::doc_generator::ContentModule;

const MAX_SIGNATURES: usize = 20;
const MAX_MEMBERS: usize = 12;
const MAX_THROWING: usize = 20;
const MAX_HOTSPOTS: usize = 5;
const MAX_DECLARATIONS: usize = 30;

/// 提炼事实时的输入
pub struct FactSource<'a> {
    pub project_name: &'a str,
    pub artifact: &'a JavaArtifact,
    pub key_files: &'a [KeyFile],
}

impl<'a> FactSource<'a> {
    pub fn facts_for(&self, module: ContentModule) -> Vec<String> {
        match module {
            ContentModule::GlobalIntro => self.global_intro(),
            ContentModule::ModuleIntro => self.module_intro(),
            ContentModule::Installation => self.installation(),
            ContentModule::Prerequisites => self.prerequisites(),
            ContentModule::UseCases => self.use_cases(),
            ContentModule::DebugSuggestions => self.debug_suggestions(),
            ContentModule::License => self.license(),
        }
    }

    fn key_files_of(&self, kind: KeyFileKind) -> impl Iterator<Item = &'a KeyFile> + 'a {
        self.key_files.iter().filter(move |f| f.kind == kind)
    }

    fn global_intro(&self) -> Vec<String> {
        let packages = self.artifact.packages();
        let counts = self
            .artifact
            .kind_counts()
            .into_iter()
            .map(|(kind, n)| format!("{} {}", n, kind))
            .collect::<Vec<_>>()
            .join(", ");

        let mut facts = vec![format!("Project: {}", self.project_name)];
        facts.push(format!(
            "Types: {} in {} packages ({})",
            self.artifact.records.len(),
            packages.len(),
            if counts.is_empty() { "none".to_string() } else { counts }
        ));
        if !packages.is_empty() {
            facts.push(format!(
                "Packages: {}",
                packages.keys().copied().collect::<Vec<_>>().join(", ")
            ));
        }

        // 优先列出 public 类型，没有时退回全部
        let public: Vec<&TypeRecord> = self.artifact.records.iter().filter(|r| r.is_public()).collect();
        let listed: Vec<&TypeRecord> = if public.is_empty() {
            self.artifact.records.iter().collect()
        } else {
            public
        };
        for record in listed.into_iter().take(MAX_SIGNATURES) {
            let mut fact = format!("Type {}: {}", record.qualified_name(), record.display_signature());
            if let Some(doc) = record.doc.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
                fact.push_str(&format!(" // {}", first_sentence(doc)));
            }
            facts.push(fact);
        }

        let key_names: Vec<String> = self.key_files.iter().map(KeyFile::display_name).collect();
        if !key_names.is_empty() {
            facts.push(format!("Key files: {}", key_names.join(", ")));
        }
        facts
    }

    fn module_intro(&self) -> Vec<String> {
        let mut facts = Vec::new();

        for (package, records) in self.artifact.packages() {
            let members = records
                .iter()
                .map(|r| {
                    let methods: Vec<&str> = r
                        .methods
                        .iter()
                        .take(MAX_MEMBERS)
                        .map(|m| m.name.as_str())
                        .collect();
                    if methods.is_empty() {
                        format!("{} ({})", r.name, r.kind_label())
                    } else {
                        format!("{} ({}; methods: {})", r.name, r.kind_label(), methods.join(", "))
                    }
                })
                .collect::<Vec<_>>()
                .join("; ");
            facts.push(format!("Package {}: {}", package, members));
        }

        let java_files = self
            .key_files_of(KeyFileKind::Java)
            .filter(|f| !f.declarations.is_empty())
            .take(MAX_SIGNATURES);
        for file in java_files {
            let mut listed = file
                .declarations
                .iter()
                .take(MAX_DECLARATIONS)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if file.declarations.len() > MAX_DECLARATIONS {
                listed.push_str(", ...");
            }
            facts.push(format!("Key file {}: {}", file.display_name(), listed));
        }

        if facts.is_empty() {
            facts.push("No packages found in the structural model".to_string());
        }
        facts
    }

    fn installation(&self) -> Vec<String> {
        let mut facts = Vec::new();

        let mut build_files = self.key_files_of(KeyFileKind::Build).peekable();
        if build_files.peek().is_none() {
            facts.push("No build file among key files".to_string());
        }
        for file in build_files {
            facts.push(format!("Build file {}:\n{}", file.display_name(), file.excerpt));
        }

        let external = self.artifact.external_packages();
        if external.is_empty() {
            facts.push("External dependencies: none detected".to_string());
        } else {
            facts.push(format!(
                "External dependencies: {}",
                external.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
        facts
    }

    fn prerequisites(&self) -> Vec<String> {
        let mut facts = Vec::new();

        let mut versions: Vec<String> = Vec::new();
        for file in self.key_files {
            for version in &file.java_versions {
                versions.push(format!("{} (from {})", version, file.display_name()));
            }
        }
        if versions.is_empty() {
            facts.push("Java version: no hint found in key files".to_string());
        } else {
            facts.push(format!("Java version: {}", versions.join(", ")));
        }

        let external = self.artifact.external_packages();
        if !external.is_empty() {
            facts.push(format!(
                "Third-party packages: {}",
                external.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
        let jdk = self.artifact.jdk_packages();
        if !jdk.is_empty() {
            facts.push(format!(
                "JDK packages used: {}",
                jdk.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
        facts
    }

    fn use_cases(&self) -> Vec<String> {
        let mut facts = Vec::new();

        for record in self.artifact.records.iter().filter(|r| r.is_public()) {
            let api: Vec<String> = record
                .methods
                .iter()
                .filter(|m| m.is_public())
                .take(MAX_MEMBERS)
                .map(|m| m.display_signature())
                .collect();
            if !api.is_empty() {
                facts.push(format!("Public API {}: {}", record.qualified_name(), api.join("; ")));
            }
        }

        let entry_points: Vec<String> = self
            .artifact
            .records
            .iter()
            .filter(|r| r.methods.iter().any(|m| m.is_entry_point()))
            .map(|r| format!("{}.main", r.qualified_name()))
            .collect();
        if entry_points.is_empty() {
            facts.push("Entry points: none (library-style usage)".to_string());
        } else {
            facts.push(format!("Entry points: {}", entry_points.join(", ")));
        }
        facts
    }

    fn debug_suggestions(&self) -> Vec<String> {
        let mut facts: Vec<String> = self
            .artifact
            .dependency_hotspots(MAX_HOTSPOTS)
            .into_iter()
            .map(|(name, n)| format!("Dependency hotspot: {} is used by {} types", name, n))
            .collect();

        let throwing: Vec<String> = self
            .artifact
            .records
            .iter()
            .flat_map(|r| {
                r.methods
                    .iter()
                    .filter(|m| !m.throws.is_empty())
                    .map(move |m| format!("{}.{} throws {}", r.name, m.name, m.throws.join(", ")))
            })
            .take(MAX_THROWING)
            .collect();
        if throwing.is_empty() {
            facts.push("Declared exceptions: none".to_string());
        } else {
            facts.push(format!("Declared exceptions: {}", throwing.join("; ")));
        }
        facts
    }

    fn license(&self) -> Vec<String> {
        let facts: Vec<String> = self
            .key_files_of(KeyFileKind::License)
            .map(|f| format!("License file {}:\n{}", f.display_name(), f.excerpt))
            .collect();
        if facts.is_empty() {
            vec!["No license file provided among key files".to_string()]
        } else {
            facts
        }
    }
}

fn first_sentence(doc: &str) -> &str {
    let line = doc.lines().next().unwrap_or(doc).trim();
    match line.find(". ") {
        Some(end) => &line[..=end],
        None => line,
    }
}
