use tracing::debug;

use super::{CrosswalkError, CrosswalkResult, MetadataStream, StreamCrosswalk};
use crate::content::{ObjectId, ObjectType, PackagingContext};

pub const LICENSE_BUNDLE: &str = "LICENSE";
const LICENSE_NAME: &str = "license.txt";
const LICENSE_FORMAT: &str = "License";

/// The deposit license of an item, carried as plain text.
pub struct LicenseCrosswalk;

impl StreamCrosswalk for LicenseCrosswalk {
    fn can_handle(&self, kind: ObjectType) -> bool {
        kind == ObjectType::Item
    }

    fn disseminate(
        &self,
        ctx: &PackagingContext<'_>,
        object: ObjectId,
    ) -> CrosswalkResult<MetadataStream> {
        if ctx.content.object_type(object)? != ObjectType::Item {
            return Err(CrosswalkError::NotSupported);
        }
        let Some(bundle) = ctx
            .content
            .bundles(object)?
            .into_iter()
            .find(|b| b.name == LICENSE_BUNDLE)
        else {
            return Err(CrosswalkError::NotSupported);
        };
        let Some(license) = ctx.content.bitstreams(bundle.id)?.into_iter().next() else {
            return Err(CrosswalkError::NotSupported);
        };

        Ok(MetadataStream {
            bytes: ctx.content.retrieve(license.id)?,
            mime_type: "text/plain".to_string(),
        })
    }

    fn ingest(
        &self,
        ctx: &PackagingContext<'_>,
        object: ObjectId,
        bytes: &[u8],
        _mime_type: Option<&str>,
    ) -> CrosswalkResult<()> {
        if ctx.content.object_type(object)? != ObjectType::Item {
            return Err(CrosswalkError::NotSupported);
        }
        add_license(ctx, object, bytes.to_vec())
    }
}

/// Stores `text` as the item's deposit license unless it already has one.
pub(crate) fn add_license(
    ctx: &PackagingContext<'_>,
    item: ObjectId,
    text: Vec<u8>,
) -> CrosswalkResult<()> {
    let bundles = ctx.content.bundles(item)?;
    if let Some(existing) = bundles.iter().find(|b| b.name == LICENSE_BUNDLE) {
        if !ctx.content.bitstreams(existing.id)?.is_empty() {
            debug!("item already has a deposit license, keeping it");
            return Ok(());
        }
    }

    let bundle = match bundles.into_iter().find(|b| b.name == LICENSE_BUNDLE) {
        Some(bundle) => bundle,
        None => ctx.content.create_bundle(item, LICENSE_BUNDLE)?,
    };
    let mut bitstream = ctx.content.create_bitstream(bundle.id, LICENSE_NAME, text)?;
    if let Some(format) = ctx.content.format_by_short_name(LICENSE_FORMAT)? {
        bitstream.format = format;
        ctx.content.update_bitstream(&bitstream)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{content::ContentService, memory::MemoryRepository};

    #[test]
    fn test_license_round_trip() {
        let repo = MemoryRepository::new();
        let ctx = PackagingContext::from_repository(&repo);
        let community = repo.create_object(ObjectType::Community, repo.site()).unwrap();
        let collection = repo.create_object(ObjectType::Collection, community).unwrap();
        let item = repo.create_object(ObjectType::Item, collection).unwrap();

        assert!(matches!(
            LicenseCrosswalk.disseminate(&ctx, item),
            Err(CrosswalkError::NotSupported)
        ));

        LicenseCrosswalk.ingest(&ctx, item, b"You grant...", Some("text/plain")).unwrap();
        LicenseCrosswalk.ingest(&ctx, item, b"ignored", None).unwrap();

        let stream = LicenseCrosswalk.disseminate(&ctx, item).unwrap();
        assert_eq!(stream.bytes, b"You grant...");
        assert_eq!(stream.mime_type, "text/plain");

        let bundle = &repo.bundles(item).unwrap()[0];
        let license = &repo.bitstreams(bundle.id).unwrap()[0];
        assert_eq!(license.name, "license.txt");
        assert_eq!(license.format.short_name, "License");
    }
}
