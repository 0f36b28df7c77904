use metspack_mets::XmlElement;
use tracing::debug;

use super::{CrosswalkError, CrosswalkResult, DomCrosswalk};
use crate::content::{MetadataValue, ObjectId, ObjectType, PackagingContext};

pub const DIM_NS: &str = "http://www.dspace.org/xmlns/dspace/dim";

/// Every metadata value as a `dim:field`, and back.
pub struct DimCrosswalk;

impl DimCrosswalk {
    fn field(value: &MetadataValue) -> XmlElement {
        XmlElement::new("dim:field")
            .with_attr("mdschema", value.schema.as_str())
            .with_attr("element", value.element.as_str())
            .with_opt_attr("qualifier", value.qualifier.as_deref())
            .with_opt_attr("lang", value.language.as_deref())
            .with_text(value.value.as_str())
    }

    fn collect_fields<'a>(element: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
        if element.is("field") {
            out.push(element);
        } else if element.is("dim") {
            out.extend(element.children_named("field"));
        }
    }
}

impl DomCrosswalk for DimCrosswalk {
    fn can_handle(&self, kind: ObjectType) -> bool {
        matches!(
            kind,
            ObjectType::Site | ObjectType::Community | ObjectType::Collection | ObjectType::Item
        )
    }

    fn disseminate(
        &self,
        ctx: &PackagingContext<'_>,
        object: ObjectId,
    ) -> CrosswalkResult<Vec<XmlElement>> {
        let kind = ctx.content.object_type(object)?;
        if !self.can_handle(kind) {
            return Err(CrosswalkError::NotSupported);
        }

        let mut root = XmlElement::new("dim:dim")
            .with_attr("xmlns:dim", DIM_NS)
            .with_attr("dspaceType", kind.label());
        for value in ctx.content.metadata(object)? {
            root.push(Self::field(&value));
        }
        Ok(vec![root])
    }

    fn ingest(
        &self,
        ctx: &PackagingContext<'_>,
        object: ObjectId,
        metadata: &[XmlElement],
    ) -> CrosswalkResult<()> {
        let mut fields = Vec::new();
        for element in metadata {
            Self::collect_fields(element, &mut fields);
        }

        for field in fields {
            let (Some(schema), Some(element)) = (field.attr("mdschema"), field.attr("element"))
            else {
                return Err(CrosswalkError::Failed(
                    "dim:field is missing mdschema or element".to_string(),
                ));
            };
            let mut value = MetadataValue::new(schema, element, field.attr("qualifier"), field.text());
            value.language = field.attr("lang").map(str::to_string);
            debug!(field = %value.field_name(), "adding metadata value");
            ctx.content.add_metadata(object, value)?;
        }
        Ok(())
    }
}
