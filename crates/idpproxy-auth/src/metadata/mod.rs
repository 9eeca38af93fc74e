//! SAML metadata handling.
//!
//! Only the small slice of SAML metadata the proxy needs is modelled here:
//! entity descriptors, their SP role, and the `EntityAttributes` extension
//! that carries sealed consumer secrets.

pub mod attribute;
pub mod store;

pub use attribute::embed;
pub use store::{EntityAttribute, EntityDescriptor, MetadataError, MetadataStore};

/// Attribute name under which sealed consumer secrets are published.
pub const CUSTOMER_ATTRIBUTE: &str = "http://social2saml.nordu.net/customer";

/// NameFormat used for the customer attribute.
pub const URI_NAME_FORMAT: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:uri";

/// Namespace of the metadata attribute extension (`mdattr`).
pub const MDATTR_NS: &str = "urn:oasis:names:tc:SAML:metadata:attribute";

/// Namespace of SAML assertions (`samla`).
pub const SAML_ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// Namespace of SAML metadata.
pub const SAML_METADATA_NS: &str = "urn:oasis:names:tc:SAML:2.0:metadata";
