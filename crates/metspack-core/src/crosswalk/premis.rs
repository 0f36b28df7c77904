use metspack_mets::XmlElement;
use metspack_utils::hash::MD5;

use super::{CrosswalkError, CrosswalkResult, DomCrosswalk};
use crate::content::{ObjectId, ObjectType, PackagingContext};

pub const PREMIS_NS: &str = "info:lc/xmlns/premis-v2";

fn premis(local: &str) -> XmlElement {
    XmlElement::new(format!("premis:{local}"))
}

fn leaf(local: &str, text: impl Into<String>) -> XmlElement {
    premis(local).with_text(text)
}

fn find<'a>(element: &'a XmlElement, local: &str) -> Option<&'a XmlElement> {
    if element.is(local) {
        return Some(element);
    }
    element.elements().find_map(|child| find(child, local))
}

/// Bitstream technical metadata as a PREMIS `object`.
///
/// Ingest restores the original name and format, and rejects content whose
/// MD5 does not match the recorded message digest.
pub struct PremisCrosswalk;

impl DomCrosswalk for PremisCrosswalk {
    fn can_handle(&self, kind: ObjectType) -> bool {
        kind == ObjectType::Bitstream
    }

    fn disseminate(
        &self,
        ctx: &PackagingContext<'_>,
        object: ObjectId,
    ) -> CrosswalkResult<Vec<XmlElement>> {
        if ctx.content.object_type(object)? != ObjectType::Bitstream {
            return Err(CrosswalkError::NotSupported);
        }
        let bitstream = ctx.content.bitstream(object)?;

        let characteristics = premis("objectCharacteristics")
            .with_child(leaf("compositionLevel", "0"))
            .with_child(
                premis("fixity")
                    .with_child(leaf(
                        "messageDigestAlgorithm",
                        bitstream.checksum_algorithm.as_str(),
                    ))
                    .with_child(leaf("messageDigest", bitstream.checksum.as_str())),
            )
            .with_child(leaf("size", bitstream.size.to_string()))
            .with_child(
                premis("format").with_child(
                    premis("formatDesignation")
                        .with_child(leaf("formatName", bitstream.format.mime_type.as_str())),
                ),
            );

        let object_el = premis("object")
            .with_attr("xmlns:premis", PREMIS_NS)
            .with_child(
                premis("objectIdentifier")
                    .with_child(leaf("objectIdentifierType", "internal-id"))
                    .with_child(leaf("objectIdentifierValue", bitstream.id.to_string())),
            )
            .with_child(leaf("objectCategory", "File"))
            .with_child(characteristics)
            .with_child(leaf("originalName", bitstream.name.as_str()));

        Ok(vec![object_el])
    }

    fn ingest(
        &self,
        ctx: &PackagingContext<'_>,
        object: ObjectId,
        metadata: &[XmlElement],
    ) -> CrosswalkResult<()> {
        if ctx.content.object_type(object)? != ObjectType::Bitstream {
            return Err(CrosswalkError::NotSupported);
        }
        let Some(root) = metadata.iter().find_map(|el| find(el, "object")) else {
            return Err(CrosswalkError::Failed(
                "PREMIS metadata has no premis:object".to_string(),
            ));
        };
        let mut bitstream = ctx.content.bitstream(object)?;

        if let Some(name) = find(root, "originalName") {
            let name = name.text();
            if !name.is_empty() {
                bitstream.name = name;
            }
        }

        if let Some(fixity) = find(root, "fixity") {
            let algorithm = find(fixity, "messageDigestAlgorithm").map(|a| a.text());
            let digest = find(fixity, "messageDigest").map(|d| d.text());
            if let (Some(algorithm), Some(digest)) = (algorithm, digest) {
                if algorithm.eq_ignore_ascii_case(MD5)
                    && !digest.eq_ignore_ascii_case(&bitstream.checksum)
                {
                    return Err(CrosswalkError::Failed(format!(
                        "checksum mismatch for {}: manifest records {}, content has {}",
                        bitstream.name, digest, bitstream.checksum
                    )));
                }
            }
        }

        if let Some(format_name) = find(root, "formatName") {
            if let Some(format) = ctx.content.format_for_mime(&format_name.text())? {
                bitstream.format = format;
            }
        }

        ctx.content.update_bitstream(&bitstream)?;
        Ok(())
    }
}
