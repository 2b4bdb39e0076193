//! Parsing of chart-museum style `index.yaml` documents.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use tracing::info;

use crate::model::{
    Maintainer, Package, PackageVersion, escape_package_name, package_id,
};
use crate::source::SourceError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    pub api_version: Option<String>,
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<IndexEntry>>,
}

/// One version of one chart as listed in the index.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    #[serde(default)]
    pub name: String,
    pub version: String,
    pub app_version: Option<String>,
    pub created: Option<String>,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub urls: Vec<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub home: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub maintainers: Vec<IndexMaintainer>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexMaintainer {
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub url: Option<String>,
}

/// Parse an index document, ordering every chart's versions newest first.
pub fn parse(raw: &[u8]) -> Result<IndexFile, SourceError> {
    let mut index: IndexFile = serde_yaml_ng::from_slice(raw)
        .map_err(|e| SourceError::Parse(format!("invalid repository index: {e}")))?;

    for versions in index.entries.values_mut() {
        versions.sort_by(|a, b| compare_versions(&b.version, &a.version));
    }

    Ok(index)
}

/// Build the package listing for `repo_name`, skipping deprecated charts.
/// The result is sorted by package ID.
pub fn packages_from_index(index: &IndexFile, repo_name: &str) -> Vec<Package> {
    let mut packages: Vec<Package> = index
        .entries
        .iter()
        .filter_map(|(key, versions)| {
            let latest = versions.first()?;
            if latest.deprecated {
                info!(name = %latest.name, "skipping deprecated chart");
                return None;
            }
            let name = if latest.name.is_empty() { key } else { &latest.name };
            Some(new_package(name, versions, repo_name))
        })
        .collect();

    packages.sort_by(|a, b| a.id.cmp(&b.id));
    packages
}

fn new_package(name: &str, versions: &[IndexEntry], repo_name: &str) -> Package {
    let latest = &versions[0];
    let escaped = escape_package_name(name);

    Package {
        id: package_id(repo_name, &escaped),
        name: escaped,
        repository: repo_name.to_owned(),
        icon: latest.icon.clone().filter(|icon| !icon.is_empty()),
        description: latest.description.clone(),
        home: latest.home.clone(),
        keywords: latest.keywords.clone(),
        sources: latest.sources.clone(),
        maintainers: latest
            .maintainers
            .iter()
            .map(|m| Maintainer {
                name: m.name.clone(),
                email: m.email.clone(),
                url: m.url.clone(),
            })
            .collect(),
        category: latest.annotations.get("category").cloned(),
        deprecated: latest.deprecated,
        versions: versions
            .iter()
            .map(|entry| PackageVersion {
                version: entry.version.clone(),
                app_version: entry.app_version.clone(),
                created: entry.created.clone(),
                digest: entry.digest.clone(),
                urls: entry.urls.clone(),
            })
            .collect(),
    }
}

/// Sort key ordering versions as semver, tolerating a leading `v` and missing
/// components. Versions that do not parse order below every one that does, and
/// among themselves by raw string.
fn version_key(raw: &str) -> (Option<semver::Version>, &str) {
    (lenient_semver(raw), raw)
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    version_key(a).cmp(&version_key(b))
}

fn lenient_semver(raw: &str) -> Option<semver::Version> {
    let trimmed = raw.trim().trim_start_matches('v');
    if let Ok(version) = semver::Version::parse(trimmed) {
        return Some(version);
    }

    // Pad "1" or "1.2" (optionally with a pre-release or build suffix) out to three components.
    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);
    let dots = core.matches('.').count();
    let padded = match dots {
        0 => format!("{core}.0.0{suffix}"),
        1 => format!("{core}.0{suffix}"),
        _ => return None,
    };
    semver::Version::parse(&padded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
apiVersion: v1
entries:
  wordpress:
    - name: wordpress
      version: 1.0.0
      digest: w1
      urls: ["wordpress-1.0.0.tgz"]
    - name: wordpress
      version: 2.1.0
      digest: w2
      icon: https://example.com/wp.png
      urls: ["wordpress-2.1.0.tgz"]
      annotations:
        category: CMS
  apache:
    - name: apache
      version: 0.3.0
      digest: a1
      description: Web server
      urls: ["https://cdn.example.com/apache-0.3.0.tgz"]
      maintainers:
        - name: jane
          email: jane@example.com
  old-thing:
    - name: old-thing
      version: 1.0.0
      deprecated: true
      urls: ["old-thing-1.0.0.tgz"]
"#;

    #[test]
    fn parses_and_orders_versions_newest_first() {
        let index = parse(INDEX.as_bytes()).unwrap();
        assert_eq!(index.api_version.as_deref(), Some("v1"));

        let wordpress = &index.entries["wordpress"];
        assert_eq!(wordpress[0].version, "2.1.0");
        assert_eq!(wordpress[1].version, "1.0.0");
    }

    #[test]
    fn listing_skips_deprecated_and_sorts_by_id() {
        let index = parse(INDEX.as_bytes()).unwrap();
        let packages = packages_from_index(&index, "stable");

        let ids: Vec<&str> = packages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["stable/apache", "stable/wordpress"]);
        assert!(packages.iter().all(|p| !p.deprecated));
    }

    #[test]
    fn package_takes_metadata_from_latest_version() {
        let index = parse(INDEX.as_bytes()).unwrap();
        let packages = packages_from_index(&index, "stable");

        let wordpress = packages.iter().find(|p| p.name == "wordpress").unwrap();
        assert_eq!(wordpress.category.as_deref(), Some("CMS"));
        assert_eq!(wordpress.icon.as_deref(), Some("https://example.com/wp.png"));
        assert_eq!(wordpress.latest().unwrap().digest, "w2");

        let apache = packages.iter().find(|p| p.name == "apache").unwrap();
        assert_eq!(apache.maintainers[0].email.as_deref(), Some("jane@example.com"));
        assert!(apache.icon.is_none());
    }

    #[test]
    fn deprecation_of_latest_version_hides_whole_chart() {
        let raw = r#"
entries:
  flip:
    - name: flip
      version: 1.0.0
    - name: flip
      version: 2.0.0
      deprecated: true
  keep:
    - name: keep
      version: 1.0.0
      deprecated: true
    - name: keep
      version: 1.1.0
"#;
        let index = parse(raw.as_bytes()).unwrap();
        let packages = packages_from_index(&index, "r");

        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].id, "r/keep");
        assert_eq!(packages[0].versions.len(), 2);
    }

    #[test]
    fn nested_names_are_escaped_in_ids() {
        let raw = r#"
entries:
  foo/bar:
    - name: foo/bar
      version: 1.0.0
"#;
        let index = parse(raw.as_bytes()).unwrap();
        let packages = packages_from_index(&index, "repo");

        assert_eq!(packages[0].name, "foo%2Fbar");
        assert_eq!(packages[0].id, "repo/foo%2Fbar");
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let result = parse(b"entries: [not, a, map");
        assert!(matches!(result, Err(SourceError::Parse(_))));
    }

    #[test]
    fn lenient_versions_compare_numerically() {
        assert_eq!(compare_versions("v1.10", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("2", "1.99.99"), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0-rc.1", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("latest", "stable"), Ordering::Less);
        assert_eq!(compare_versions("1.5.x", "0.0.1"), Ordering::Less);
    }

    #[test]
    fn ordering_is_total_across_mixed_version_strings() {
        assert_eq!(compare_versions("1.9.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare_versions("1.10.0", "1.5.x"), Ordering::Greater);
        assert_eq!(compare_versions("1.5.x", "1.9.0"), Ordering::Less);

        let mut entries = String::from("entries:\n  mixed:\n");
        for n in 0..60 {
            for version in [format!("1.{n}.0"), format!("1.{n}.x"), format!("{n}.{}", n % 7)] {
                entries.push_str(&format!("    - name: mixed\n      version: \"{version}\"\n"));
            }
        }

        let index = parse(entries.as_bytes()).unwrap();
        let versions = &index.entries["mixed"];
        assert_eq!(versions.len(), 180);
        assert!(
            versions
                .windows(2)
                .all(|w| compare_versions(&w[0].version, &w[1].version) != Ordering::Less)
        );
        assert_eq!(versions[0].version, "59.3");
        assert!(versions.last().unwrap().version.ends_with(".x"));
    }
}
