//! Renders a sealed token as an `EntityAttributes` metadata extension.

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use super::{MDATTR_NS, SAML_ASSERTION_NS, URI_NAME_FORMAT};
use crate::ProxyResult;
use crate::error::ProxyError;

/// Wraps `token` in an `mdattr:EntityAttributes` fragment.
///
/// The fragment holds exactly one `samla:Attribute` named `attribute_name`
/// with one `samla:AttributeValue` whose text is the token. No XML
/// declaration is written so the result can be pasted into an SP's
/// `Extensions` element.
pub fn embed(token: &str, attribute_name: &str) -> ProxyResult<String> {
    let mut writer = Writer::new(Vec::new());

    let mut entity_attributes = BytesStart::new("mdattr:EntityAttributes");
    entity_attributes.push_attribute(("xmlns:mdattr", MDATTR_NS));
    entity_attributes.push_attribute(("xmlns:samla", SAML_ASSERTION_NS));

    let mut attribute = BytesStart::new("samla:Attribute");
    attribute.push_attribute(("Name", attribute_name));
    attribute.push_attribute(("NameFormat", URI_NAME_FORMAT));

    let events = [
        Event::Start(entity_attributes),
        Event::Start(attribute),
        Event::Start(BytesStart::new("samla:AttributeValue")),
        Event::Text(BytesText::new(token)),
        Event::End(BytesEnd::new("samla:AttributeValue")),
        Event::End(BytesEnd::new("samla:Attribute")),
        Event::End(BytesEnd::new("mdattr:EntityAttributes")),
    ];
    for event in events {
        writer
            .write_event(event)
            .map_err(|e| ProxyError::encryption(format!("Failed to write metadata XML: {e}")))?;
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| ProxyError::internal(format!("Metadata XML is not UTF-8: {e}")))
}
