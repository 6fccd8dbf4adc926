//! Parsing of the `.application` descriptor and the deployment manifest it points at.
//!
//! Both documents share the `asm.v2` structure namespace and carry their
//! digests as `xmldsig` `DigestMethod`/`DigestValue` pairs.

use log::debug;
use roxmltree::{Document, Node};

use crate::digest::DigestAlgorithm;
use crate::engine::models::{EntryKind, FileEntry, ManifestReference};
use crate::error::{DeployError, Result};

pub const ASM_V2_NS: &str = "urn:schemas-microsoft-com:asm.v2";
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

const INSTALL_DEPENDENCY: &str = "install";

/// Extract the deployment manifest reference from a `.application` document.
pub fn parse_application(bytes: &[u8]) -> Result<ManifestReference> {
    let text = decode(bytes)?;
    let doc = parse_xml(text)?;

    let dependency = doc
        .descendants()
        .find(|n| n.has_tag_name((ASM_V2_NS, "dependency")))
        .ok_or_else(|| DeployError::malformed("application has no <dependency> element"))?;
    let assembly = dependency
        .descendants()
        .find(|n| n.has_tag_name((ASM_V2_NS, "dependentAssembly")))
        .ok_or_else(|| {
            DeployError::malformed("application <dependency> has no <dependentAssembly>")
        })?;

    let relative_path = required_attribute(assembly, "codebase")?;
    let (algorithm, digest) = digest_pair(assembly, relative_path)?;
    debug!("manifest: application references {relative_path} ({algorithm:?})");

    Ok(ManifestReference {
        relative_path: relative_path.to_owned(),
        digest,
        algorithm,
    })
}

/// Extract the ordered download list from a deployment manifest.
///
/// Install-type assemblies come first (the primary one leading), then every
/// `<file>` in document order.
pub fn parse_deployment(bytes: &[u8]) -> Result<Vec<FileEntry>> {
    let text = decode(bytes)?;
    let doc = parse_xml(text)?;

    let mut entries = Vec::new();
    for assembly in doc.descendants().filter(|n| {
        n.has_tag_name((ASM_V2_NS, "dependentAssembly"))
            && n.attribute("dependencyType") == Some(INSTALL_DEPENDENCY)
    }) {
        let relative_path = required_attribute(assembly, "codebase")?;
        let declared_size = match assembly.attribute("size") {
            Some(raw) => parse_size(raw, relative_path)?,
            None => 0,
        };
        let (algorithm, digest) = digest_pair(assembly, relative_path)?;
        entries.push(FileEntry {
            relative_path: relative_path.to_owned(),
            declared_size,
            digest,
            algorithm,
            kind: EntryKind::Assembly,
        });
    }
    if entries.is_empty() {
        return Err(DeployError::malformed(
            "deployment manifest has no install-type <dependentAssembly>",
        ));
    }

    for file in doc
        .descendants()
        .filter(|n| n.has_tag_name((ASM_V2_NS, "file")))
    {
        let relative_path = required_attribute(file, "name")?;
        let declared_size = parse_size(required_attribute(file, "size")?, relative_path)?;
        let (algorithm, digest) = digest_pair(file, relative_path)?;
        entries.push(FileEntry {
            relative_path: relative_path.to_owned(),
            declared_size,
            digest,
            algorithm,
            kind: EntryKind::File,
        });
    }

    debug!("manifest: {} entries declared", entries.len());
    Ok(entries)
}

fn decode(bytes: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| DeployError::malformed(format!("document is not UTF-8: {err}")))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

fn parse_xml(text: &str) -> Result<Document<'_>> {
    Document::parse(text).map_err(|err| DeployError::malformed(format!("invalid XML: {err}")))
}

fn required_attribute<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name).ok_or_else(|| {
        DeployError::malformed(format!(
            "<{}> is missing the {name} attribute",
            node.tag_name().name()
        ))
    })
}

fn parse_size(raw: &str, owner: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|_| DeployError::malformed(format!("{owner}: invalid size {raw:?}")))
}

/// Read the `DigestMethod`/`DigestValue` pair nested under `node`.
fn digest_pair(node: Node<'_, '_>, owner: &str) -> Result<(DigestAlgorithm, String)> {
    let method = node
        .descendants()
        .find(|n| n.has_tag_name((XMLDSIG_NS, "DigestMethod")))
        .ok_or_else(|| DeployError::malformed(format!("{owner}: no DigestMethod")))?;
    let identifier = method
        .attribute("Algorithm")
        .ok_or_else(|| DeployError::malformed(format!("{owner}: DigestMethod has no Algorithm")))?;
    let algorithm = DigestAlgorithm::from_identifier(identifier)?;

    let digest = node
        .descendants()
        .find(|n| n.has_tag_name((XMLDSIG_NS, "DigestValue")))
        .and_then(|n| n.text())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DeployError::malformed(format!("{owner}: no DigestValue")))?;

    Ok((algorithm, digest.to_owned()))
}


#[cfg(test)]
mod tests {
    use super::fixtures::{Declared, application, deployment};
    use super::*;

    #[test]
    fn reads_manifest_reference() {
        let xml = application(
            r"Application Files\App_1_0_0_3\App.exe.manifest",
            DigestAlgorithm::Sha256,
            "D1+/=",
        );
        let reference = parse_application(xml.as_bytes()).unwrap();
        assert_eq!(
            reference,
            ManifestReference {
                relative_path: r"Application Files\App_1_0_0_3\App.exe.manifest".into(),
                digest: "D1+/=".into(),
                algorithm: DigestAlgorithm::Sha256,
            }
        );
    }

    #[test]
    fn accepts_byte_order_mark() {
        let xml = format!(
            "\u{feff}{}",
            application(r"Sub\App.manifest", DigestAlgorithm::Sha1, "abc=")
        );
        let reference = parse_application(xml.as_bytes()).unwrap();
        assert_eq!(reference.algorithm, DigestAlgorithm::Sha1);
    }

    #[test]
    fn application_without_dependency_is_malformed() {
        let xml = r#"<assembly xmlns="urn:schemas-microsoft-com:asm.v2"><deployment /></assembly>"#;
        assert!(matches!(
            parse_application(xml.as_bytes()),
            Err(DeployError::MalformedManifest(_))
        ));
    }

    #[test]
    fn application_dependency_in_wrong_namespace_is_malformed() {
        let xml = r#"<assembly xmlns="urn:example"><dependency><dependentAssembly codebase="x" /></dependency></assembly>"#;
        assert!(matches!(
            parse_application(xml.as_bytes()),
            Err(DeployError::MalformedManifest(_))
        ));
    }

    #[test]
    fn application_without_codebase_is_malformed() {
        let xml = application(r"Sub\App.manifest", DigestAlgorithm::Sha256, "x")
            .replace(r#"codebase="Sub\App.manifest""#, "");
        assert!(matches!(
            parse_application(xml.as_bytes()),
            Err(DeployError::MalformedManifest(_))
        ));
    }

    #[test]
    fn application_without_digest_value_is_malformed() {
        let xml = application(r"Sub\App.manifest", DigestAlgorithm::Sha256, "");
        assert!(matches!(
            parse_application(xml.as_bytes()),
            Err(DeployError::MalformedManifest(_))
        ));
    }

    #[test]
    fn invalid_xml_is_malformed() {
        assert!(matches!(
            parse_application(b"<assembly><dependency>"),
            Err(DeployError::MalformedManifest(_))
        ));
        assert!(matches!(
            parse_deployment(&[0xff, 0xfe, 0x00]),
            Err(DeployError::MalformedManifest(_))
        ));
    }

    #[test]
    fn lists_assembly_first_then_files_in_order() {
        let xml = deployment(
            &[Declared {
                path: "App.exe",
                size: 1024,
                alg: DigestAlgorithm::Sha1,
                digest: "D2",
            }],
            &[
                Declared {
                    path: r"Data\file.txt",
                    size: 10,
                    alg: DigestAlgorithm::Sha256,
                    digest: "D3",
                },
                Declared {
                    path: "App.exe.config",
                    size: 200,
                    alg: DigestAlgorithm::Sha256,
                    digest: "D4",
                },
            ],
        );
        let entries = parse_deployment(xml.as_bytes()).unwrap();
        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.relative_path.as_str(), e.declared_size, e.digest.as_str(), e.kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("App.exe", 1024, "D2", EntryKind::Assembly),
                (r"Data\file.txt", 10, "D3", EntryKind::File),
                ("App.exe.config", 200, "D4", EntryKind::File),
            ]
        );
        assert_eq!(entries[0].algorithm, DigestAlgorithm::Sha1);
        assert_eq!(entries[1].algorithm, DigestAlgorithm::Sha256);
    }

    #[test]
    fn every_install_assembly_precedes_files() {
        let sha1 = DigestAlgorithm::Sha1.identifier();
        let xml = format!(
            r#"<assembly xmlns="urn:schemas-microsoft-com:asm.v2" xmlns:dsig="http://www.w3.org/2000/09/xmldsig#">
  <file name="a.txt" size="3">
    <hash><dsig:DigestMethod Algorithm="{sha1}" /><dsig:DigestValue>F1</dsig:DigestValue></hash>
  </file>
  <dependency>
    <dependentAssembly dependencyType="preRequisite" codebase="Runtime.dll" size="9">
      <hash><dsig:DigestMethod Algorithm="{sha1}" /><dsig:DigestValue>P</dsig:DigestValue></hash>
    </dependentAssembly>
  </dependency>
  <dependency>
    <dependentAssembly dependencyType="install" codebase="App.exe">
      <hash><dsig:DigestMethod Algorithm="{sha1}" /><dsig:DigestValue>A1</dsig:DigestValue></hash>
    </dependentAssembly>
  </dependency>
  <dependency>
    <dependentAssembly dependencyType="install" codebase="Lib.dll" size="7">
      <hash><dsig:DigestMethod Algorithm="{sha1}" /><dsig:DigestValue>A2</dsig:DigestValue></hash>
    </dependentAssembly>
  </dependency>
</assembly>"#
        );
        let entries = parse_deployment(xml.as_bytes()).unwrap();
        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.relative_path.as_str(), e.declared_size, e.digest.as_str(), e.kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("App.exe", 0, "A1", EntryKind::Assembly),
                ("Lib.dll", 7, "A2", EntryKind::Assembly),
                ("a.txt", 3, "F1", EntryKind::File),
            ]
        );
    }

    #[test]
    fn fixture_assemblies_keep_their_order() {
        let assemblies = [
            Declared {
                path: "App.exe",
                size: 10,
                alg: DigestAlgorithm::Sha256,
                digest: "A1",
            },
            Declared {
                path: "Lib.dll",
                size: 20,
                alg: DigestAlgorithm::Sha256,
                digest: "A2",
            },
        ];
        let entries = parse_deployment(deployment(&assemblies, &[]).as_bytes()).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["App.exe", "Lib.dll"]);
        assert!(entries.iter().all(|e| e.kind == EntryKind::Assembly));
    }

    #[test]
    fn deployment_without_install_assembly_is_malformed() {
        let xml = deployment(
            &[],
            &[Declared {
                path: "readme.txt",
                size: 1,
                alg: DigestAlgorithm::Sha256,
                digest: "x",
            }],
        );
        assert!(matches!(
            parse_deployment(xml.as_bytes()),
            Err(DeployError::MalformedManifest(_))
        ));
    }

    #[test]
    fn file_without_digest_is_malformed() {
        let xml = r#"<assembly xmlns="urn:schemas-microsoft-com:asm.v2" xmlns:dsig="http://www.w3.org/2000/09/xmldsig#">
  <dependency>
    <dependentAssembly dependencyType="install" codebase="App.exe" size="1">
      <hash><dsig:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1" /><dsig:DigestValue>x</dsig:DigestValue></hash>
    </dependentAssembly>
  </dependency>
  <file name="loose.txt" size="3" />
</assembly>"#;
        assert!(matches!(
            parse_deployment(xml.as_bytes()),
            Err(DeployError::MalformedManifest(_))
        ));
    }

    #[test]
    fn file_with_bad_size_is_malformed() {
        let xml = deployment(
            &[Declared {
                path: "App.exe",
                size: 1,
                alg: DigestAlgorithm::Sha1,
                digest: "x",
            }],
            &[Declared {
                path: "a.txt",
                size: 5,
                alg: DigestAlgorithm::Sha1,
                digest: "y",
            }],
        )
        .replace(r#"size="5""#, r#"size="-5""#);
        assert!(matches!(
            parse_deployment(xml.as_bytes()),
            Err(DeployError::MalformedManifest(_))
        ));
    }

    #[test]
    fn unknown_digest_method_is_unsupported() {
        let xml = deployment(
            &[Declared {
                path: "App.exe",
                size: 1,
                alg: DigestAlgorithm::Sha256,
                digest: "x",
            }],
            &[],
        )
        .replace(
            "http://www.w3.org/2000/09/xmldsig#sha256",
            "http://www.w3.org/2001/04/xmlenc#sha512",
        );
        match parse_deployment(xml.as_bytes()) {
            Err(DeployError::UnsupportedAlgorithm(id)) => {
                assert_eq!(id, "http://www.w3.org/2001/04/xmlenc#sha512")
            }
            other => panic!("expected UnsupportedAlgorithm, got {other:?}"),
        }
    }

    #[test]
    fn digest_value_is_kept_verbatim() {
        let xml = deployment(
            &[Declared {
                path: "App.exe",
                size: 1,
                alg: DigestAlgorithm::Sha256,
                digest: " AbC= ",
            }],
            &[],
        );
        let entries = parse_deployment(xml.as_bytes()).unwrap();
        assert_eq!(entries[0].digest, " AbC= ");
    }
}
