//! In-memory store of SAML entity descriptors.
//!
//! The parser is namespace-prefix agnostic: elements are matched on their
//! local names, so `md:EntityDescriptor` and a default-namespaced
//! `EntityDescriptor` are treated alike. Only extension attributes under an
//! SP role (`SPSSODescriptor/Extensions/EntityAttributes`) are collected.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::ProxyError;

/// Errors raised while loading metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The document is not well-formed XML.
    #[error("Malformed metadata XML at byte {position}: {message}")]
    Malformed {
        /// Byte offset the reader had reached.
        position: u64,
        /// Parser message.
        message: String,
    },

    /// The XML is well-formed but not usable metadata.
    #[error("Invalid metadata: {0}")]
    Invalid(String),

    /// A metadata file could not be read.
    #[error("Failed to read metadata file {path}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl From<MetadataError> for ProxyError {
    fn from(err: MetadataError) -> Self {
        ProxyError::metadata(err.to_string())
    }
}

/// A SAML `Attribute` found in an entity's `EntityAttributes` extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityAttribute {
    /// The `Name` of the attribute.
    pub name: String,
    /// The `NameFormat`, when present.
    pub name_format: Option<String>,
    /// Text of each `AttributeValue`, in document order.
    pub values: Vec<String>,
}

/// One `EntityDescriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// The `entityID`.
    pub entity_id: String,
    /// Whether the entity has an `SPSSODescriptor`.
    pub has_sp_role: bool,
    /// Extension attributes declared under the SP role.
    pub sp_attributes: Vec<EntityAttribute>,
}

impl EntityDescriptor {
    fn new(entity_id: String) -> Self {
        Self {
            entity_id,
            has_sp_role: false,
            sp_attributes: Vec::new(),
        }
    }

    /// Values of every SP extension attribute named `name`.
    pub fn attribute_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.sp_attributes
            .iter()
            .filter(move |attr| attr.name == name)
            .flat_map(|attr| attr.values.iter().map(String::as_str))
    }
}

/// Entity descriptors keyed by entity id, in document order.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    entities: Vec<EntityDescriptor>,
    index: HashMap<String, usize>,
}

impl MetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a metadata document (a single `EntityDescriptor` or an
    /// `EntitiesDescriptor`).
    pub fn from_xml(xml: &str) -> Result<Self, MetadataError> {
        let mut store = Self::new();
        store.add_xml(xml)?;
        Ok(store)
    }

    /// Loads and merges several metadata files.
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, MetadataError> {
        let mut store = Self::new();
        for path in paths {
            let path = path.as_ref();
            let xml = std::fs::read_to_string(path).map_err(|source| MetadataError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let before = store.len();
            store.add_xml(&xml)?;
            tracing::info!(
                path = %path.display(),
                entities = store.len() - before,
                "Loaded metadata file"
            );
        }
        Ok(store)
    }

    /// Parses `xml` and adds its entities. A repeated entity id replaces the
    /// earlier descriptor in place.
    pub fn add_xml(&mut self, xml: &str) -> Result<(), MetadataError> {
        for entity in parse_entities(xml)? {
            self.insert(entity);
        }
        Ok(())
    }

    fn insert(&mut self, entity: EntityDescriptor) {
        match self.index.get(&entity.entity_id) {
            Some(&pos) => {
                tracing::warn!(entity_id = %entity.entity_id, "Duplicate entity descriptor replaced");
                self.entities[pos] = entity;
            }
            None => {
                self.index
                    .insert(entity.entity_id.clone(), self.entities.len());
                self.entities.push(entity);
            }
        }
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity has been loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Looks up an entity by id.
    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<&EntityDescriptor> {
        self.index.get(entity_id).map(|&pos| &self.entities[pos])
    }

    /// All entities in document order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.iter()
    }

    /// Entity ids in document order.
    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.entity_id.as_str())
    }

    /// Ids of the entities that have an SP role.
    pub fn sp_entity_ids(&self) -> impl Iterator<Item = &str> {
        self.entities
            .iter()
            .filter(|e| e.has_sp_role)
            .map(|e| e.entity_id.as_str())
    }

    /// The SP-role extension attributes of `entity_id`.
    #[must_use]
    pub fn sp_entity_attributes(&self, entity_id: &str) -> &[EntityAttribute] {
        self.get(entity_id)
            .map(|e| e.sp_attributes.as_slice())
            .unwrap_or_default()
    }

    /// The first entity id in document order.
    #[must_use]
    pub fn first_entity_id(&self) -> Option<&str> {
        self.entities.first().map(|e| e.entity_id.as_str())
    }
}

const ENTITY_DESCRIPTOR: &[u8] = b"EntityDescriptor";
const SP_ROLE: &[u8] = b"SPSSODescriptor";
const EXTENSIONS: &[u8] = b"Extensions";
const ENTITY_ATTRIBUTES: &[u8] = b"EntityAttributes";
const ATTRIBUTE: &[u8] = b"Attribute";
const ATTRIBUTE_VALUE: &[u8] = b"AttributeValue";

/// Element path from an `SPSSODescriptor` down to its extension attributes.
const SP_ATTRIBUTES_PATH: [&[u8]; 3] = [SP_ROLE, EXTENSIONS, ENTITY_ATTRIBUTES];

fn ends_with(stack: &[Vec<u8>], path: &[&[u8]]) -> bool {
    stack.len() >= path.len()
        && stack[stack.len() - path.len()..]
            .iter()
            .zip(path)
            .all(|(a, b)| a.as_slice() == *b)
}

fn attr_value(
    element: &BytesStart<'_>,
    local_name: &[u8],
) -> Result<Option<String>, quick_xml::Error> {
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == local_name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[derive(Default)]
struct Parser {
    stack: Vec<Vec<u8>>,
    entities: Vec<EntityDescriptor>,
    entity: Option<EntityDescriptor>,
    attribute: Option<EntityAttribute>,
    value: Option<String>,
}

impl Parser {
    fn open(&mut self, element: &BytesStart<'_>) -> Result<(), MetadataError> {
        let name = element.local_name();
        let name = name.as_ref();
        let malformed = |e: quick_xml::Error| MetadataError::Malformed {
            position: 0,
            message: e.to_string(),
        };

        if name == ENTITY_DESCRIPTOR {
            if self.entity.is_some() {
                return Err(MetadataError::Invalid(
                    "nested EntityDescriptor".to_string(),
                ));
            }
            let entity_id = attr_value(element, b"entityID")
                .map_err(malformed)?
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| {
                    MetadataError::Invalid("EntityDescriptor without entityID".to_string())
                })?;
            self.entity = Some(EntityDescriptor::new(entity_id));
        } else if name == SP_ROLE {
            if let Some(entity) = self.entity.as_mut() {
                entity.has_sp_role = true;
            }
        } else if name == ATTRIBUTE
            && self.entity.is_some()
            && ends_with(&self.stack, &SP_ATTRIBUTES_PATH)
        {
            self.attribute = Some(EntityAttribute {
                name: attr_value(element, b"Name")
                    .map_err(malformed)?
                    .unwrap_or_default(),
                name_format: attr_value(element, b"NameFormat").map_err(malformed)?,
                values: Vec::new(),
            });
        } else if name == ATTRIBUTE_VALUE
            && self.attribute.is_some()
            && self.stack.last().is_some_and(|top| top.as_slice() == ATTRIBUTE)
        {
            self.value = Some(String::new());
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        if name == ATTRIBUTE_VALUE {
            if let (Some(value), Some(attribute)) = (self.value.take(), self.attribute.as_mut()) {
                attribute.values.push(value);
            }
        } else if name == ATTRIBUTE {
            if let (Some(attribute), Some(entity)) = (self.attribute.take(), self.entity.as_mut()) {
                entity.sp_attributes.push(attribute);
            }
        } else if name == ENTITY_DESCRIPTOR {
            if let Some(entity) = self.entity.take() {
                self.entities.push(entity);
            }
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(value) = self.value.as_mut() {
            value.push_str(text);
        }
    }
}

fn parse_entities(xml: &str) -> Result<Vec<EntityDescriptor>, MetadataError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut parser = Parser::default();

    loop {
        let malformed = |reader: &Reader<&[u8]>, e: quick_xml::Error| MetadataError::Malformed {
            position: reader.buffer_position(),
            message: e.to_string(),
        };

        match reader.read_event() {
            Ok(Event::Start(e)) => {
                parser.open(&e)?;
                parser.stack.push(e.local_name().as_ref().to_vec());
            }
            Ok(Event::Empty(e)) => {
                parser.open(&e)?;
                parser.close(e.local_name().as_ref());
            }
            Ok(Event::End(e)) => {
                parser.stack.pop();
                parser.close(e.local_name().as_ref());
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| malformed(&reader, err))?;
                parser.text(&text);
            }
            Ok(Event::CData(e)) => {
                parser.text(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(&reader, e)),
        }
    }

    if !parser.stack.is_empty() {
        return Err(MetadataError::Malformed {
            position: reader.buffer_position(),
            message: "unexpected end of document".to_string(),
        });
    }

    Ok(parser.entities)
}
