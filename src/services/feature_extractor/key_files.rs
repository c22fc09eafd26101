//! 关键文件读取
//!
//! 用户指定的关键文件（目录会展开为其下所有文件）。
//! Java 文件用正则提取类和方法声明，其余文件保留开头一段摘录。

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

static RE_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:public|private|protected)?\s*(?:static\s+)?(?:final\s+)?(?:abstract\s+)?(class|interface|enum|record)\s+(\w+)(?:<[^>{]*>)?(?:\s+extends\s+([\w.<>, ]+?))?(?:\s+implements\s+([\w.<>, ]+?))?\s*[({]?\s*$").unwrap()
});
static RE_METHOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+(?:public|private|protected)?\s*(?:static\s+)?(?:final\s+)?(?:synchronized\s+)?(?:<[^>]+>\s+)?(?:[\w.]+(?:<[^>]*>)?(?:\[\])*\s+)(\w+)\s*\(").unwrap()
});
static RE_JAVA_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:<(?:maven\.compiler\.(?:source|target|release)|java\.version|release)>\s*([0-9][0-9.]*)\s*<|(?:sourceCompatibility|targetCompatibility)\s*=\s*(?:JavaVersion\.VERSION_)?['"]?([0-9][0-9._]*)|JavaLanguageVersion\.of\(\s*([0-9]+)\s*\))"#).unwrap()
});

/// 不应当作方法名的关键字
const JAVA_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "catch", "return", "new", "throw", "else", "synchronized"];

const BUILD_FILES: &[&str] = &[
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "settings.gradle",
    "settings.gradle.kts",
    "gradle.properties",
    "build.xml",
    "mvnw",
    "gradlew",
];

const LICENSE_PREFIXES: &[&str] = &["LICENSE", "LICENCE", "COPYING", "NOTICE"];

/// 单次运行最多读取的关键文件数
pub const MAX_KEY_FILES: usize = 64;

/// 关键文件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFileKind {
    Java,
    Build,
    License,
    Other,
}

impl KeyFileKind {
    fn of(path: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let upper = file_name.to_uppercase();

        if file_name.ends_with(".java") {
            KeyFileKind::Java
        } else if BUILD_FILES.contains(&file_name.as_str()) {
            KeyFileKind::Build
        } else if LICENSE_PREFIXES.iter().any(|p| upper.starts_with(p)) {
            KeyFileKind::License
        } else {
            KeyFileKind::Other
        }
    }
}

/// 已读取的关键文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFile {
    pub path: PathBuf,
    pub kind: KeyFileKind,
    /// Java 声明（仅 Java 文件）
    pub declarations: Vec<String>,
    /// 开头摘录（非 Java 文件）
    pub excerpt: String,
    /// 在全文中找到的 Java 版本
    pub java_versions: Vec<String>,
}

impl KeyFile {
    /// 从内容构建
    pub fn from_content(path: PathBuf, content: &str, excerpt_chars: usize) -> Self {
        let kind = KeyFileKind::of(&path);
        let (declarations, excerpt) = match kind {
            KeyFileKind::Java => (java_declarations(content), String::new()),
            _ => (Vec::new(), excerpt(content, excerpt_chars)),
        };

        Self {
            path,
            kind,
            declarations,
            excerpt,
            java_versions: java_versions(content),
        }
    }

    pub fn display_name(&self) -> String {
        self.path.display().to_string()
    }
}

/// 提取 Java 类型与方法声明
pub fn java_declarations(content: &str) -> Vec<String> {
    let mut declarations = Vec::new();

    for line in content.lines() {
        let stripped = line.trim();

        // 类型定义
        if let Some(caps) = RE_TYPE.captures(stripped) {
            let mut decl = format!("{} {}", &caps[1], &caps[2]);
            if let Some(parent) = caps.get(3) {
                decl.push_str(&format!(" extends {}", parent.as_str().trim()));
            }
            if let Some(interfaces) = caps.get(4) {
                decl.push_str(&format!(" implements {}", interfaces.as_str().trim()));
            }
            declarations.push(decl);
            continue;
        }

        // 方法定义
        if let Some(caps) = RE_METHOD.captures(line) {
            let method_name = &caps[1];
            if !JAVA_KEYWORDS.contains(&method_name) {
                declarations.push(format!("method {}", method_name));
            }
        }
    }

    declarations
}

fn java_versions(content: &str) -> Vec<String> {
    let mut versions: Vec<String> = Vec::new();
    for caps in RE_JAVA_VERSION.captures_iter(content) {
        let version = (1..=3)
            .find_map(|i| caps.get(i))
            .map(|m| m.as_str().replace('_', "."));
        if let Some(version) = version {
            if !versions.contains(&version) {
                versions.push(version);
            }
        }
    }
    versions
}

fn excerpt(content: &str, max_chars: usize) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}\n...", cut.trim_end())
}

/// 展开目录（按文件名排序，跳过隐藏项）
fn expand(path: &Path) -> Vec<PathBuf> {
    if !path.is_dir() {
        return vec![path.to_path_buf()];
    }

    WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping key file entry under {}: {}", path.display(), e);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// 读取关键文件，无法读取的记录日志后跳过；超过 `MAX_KEY_FILES` 的部分忽略
pub fn read_key_files(paths: &[PathBuf], excerpt_chars: usize) -> Vec<KeyFile> {
    let mut files = Vec::new();

    for path in paths.iter().flat_map(|p| expand(p)) {
        if files.len() == MAX_KEY_FILES {
            warn!("Only the first {} key files are used", MAX_KEY_FILES);
            break;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => files.push(KeyFile::from_content(path, &content, excerpt_chars)),
            Err(e) => warn!("Skipping unreadable key file {}: {}", path.display(), e),
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ORDER_SERVICE: &str = r#"package shop.service;

public class OrderService extends BaseService implements Auditable {
    private final OrderRepo repo;

    public Order place(Cart cart) throws StockException {
        if (cart.isEmpty()) {
            return null;
        }
        return repo.save(new Order(cart));
    }

    static List<Order> recent(int limit) {
        return List.of();
    }
}

interface Auditable {
    void audit();
}
"#;

    #[test]
    fn test_java_declarations() {
        assert_eq!(
            java_declarations(ORDER_SERVICE),
            vec![
                "class OrderService extends BaseService implements Auditable",
                "method place",
                "method recent",
                "interface Auditable",
                "method audit",
            ]
        );
    }

    #[test]
    fn test_java_versions_from_build_files() {
        let pom = "<properties>\n  <maven.compiler.source>17</maven.compiler.source>\n  <java.version>17</java.version>\n</properties>";
        assert_eq!(java_versions(pom), vec!["17"]);

        let gradle = "java {\n  sourceCompatibility = JavaVersion.VERSION_1_8\n}\ntoolchain { languageVersion = JavaLanguageVersion.of(21) }";
        assert_eq!(java_versions(gradle), vec!["1.8", "21"]);
    }

    #[test]
    fn test_kind_detection() {
        assert_eq!(KeyFileKind::of(Path::new("x/pom.xml")), KeyFileKind::Build);
        assert_eq!(KeyFileKind::of(Path::new("LICENSE.md")), KeyFileKind::License);
        assert_eq!(KeyFileKind::of(Path::new("src/App.java")), KeyFileKind::Java);
        assert_eq!(KeyFileKind::of(Path::new("README.md")), KeyFileKind::Other);
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let file = KeyFile::from_content(PathBuf::from("README.md"), "abcdefghij", 4);
        assert_eq!(file.excerpt, "abcd\n...");
        assert!(file.declarations.is_empty());
    }

    #[test]
    fn test_read_key_files_expands_directories_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join(".git")).unwrap();
        fs::write(src.join("B.java"), "public class B {\n}\n").unwrap();
        fs::write(src.join("A.java"), "public class A {\n}\n").unwrap();
        fs::write(src.join(".git/HEAD"), "ref").unwrap();
        fs::write(dir.path().join("LICENSE"), "MIT License").unwrap();

        let files = read_key_files(
            &[src.clone(), dir.path().join("missing.txt"), dir.path().join("LICENSE")],
            100,
        );

        let names: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            names,
            vec![src.join("A.java"), src.join("B.java"), dir.path().join("LICENSE")]
        );
        assert_eq!(files[0].declarations, vec!["class A"]);
        assert_eq!(files[2].kind, KeyFileKind::License);
        assert_eq!(files[2].excerpt, "MIT License");
    }

    #[test]
    fn test_read_key_files_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..MAX_KEY_FILES + 6 {
            fs::write(dir.path().join(format!("F{:03}.java", i)), "class F {\n}\n").unwrap();
        }

        let files = read_key_files(&[dir.path().to_path_buf()], 100);

        assert_eq!(files.len(), MAX_KEY_FILES);
        assert_eq!(files[0].path, dir.path().join("F000.java"));
    }
}
