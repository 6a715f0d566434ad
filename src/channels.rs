//! Channel registry — static mapping from an entity family to its channels.
//!
//! Each family (e.g. `"User"`) owns two External channels that the transport
//! touches and ten Internal channels (one dispatch and one completion channel
//! per CRUD action). The registry is loaded once and read-only afterwards.
//!
//! ## Naming convention
//!
//! ```text
//! External: UserEvent, UserCompletedEvent
//! Internal: UserCreateEvent, UserCreateCompletedEvent, ... UserGetAllCompletedEvent
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::message::Action;

/// Errors raised while building or querying a [`ChannelRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// Lookup of a family that was never registered.
    #[error("unknown channel family: {0}")]
    UnknownChannelFamily(String),
    /// The same channel name appears twice in the registry.
    #[error("channel name registered twice: {0}")]
    DuplicateChannel(String),
    /// A channel document could not be parsed.
    #[error("failed to parse channel registry: {0}")]
    Parse(String),
    /// A channel document could not be read.
    #[error("failed to read channel registry: {0}")]
    Io(String),
}

/// Gateway-facing channels of a family.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExternalChannels {
    pub event: String,
    pub completed_event: String,
}

/// Service-facing channels of a family.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InternalChannels {
    pub create_event: String,
    pub create_completed_event: String,
    pub update_event: String,
    pub update_completed_event: String,
    pub delete_event: String,
    pub delete_completed_event: String,
    pub get_single_event: String,
    pub get_single_completed_event: String,
    pub get_all_event: String,
    pub get_all_completed_event: String,
}

/// The full channel set of one entity family.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChannelDescriptor {
    #[serde(skip)]
    family: String,
    pub external: ExternalChannels,
    pub internal: InternalChannels,
}

impl ChannelDescriptor {
    /// Build the descriptor for `family` using the standard naming convention.
    pub fn conventional(family: &str) -> Self {
        let dispatch = |a: Action| format!("{family}{}Event", a.channel_fragment());
        let completed = |a: Action| format!("{family}{}CompletedEvent", a.channel_fragment());
        Self {
            family: family.to_string(),
            external: ExternalChannels {
                event: format!("{family}Event"),
                completed_event: format!("{family}CompletedEvent"),
            },
            internal: InternalChannels {
                create_event: dispatch(Action::Create),
                create_completed_event: completed(Action::Create),
                update_event: dispatch(Action::Update),
                update_completed_event: completed(Action::Update),
                delete_event: dispatch(Action::Delete),
                delete_completed_event: completed(Action::Delete),
                get_single_event: dispatch(Action::GetSingle),
                get_single_completed_event: completed(Action::GetSingle),
                get_all_event: dispatch(Action::GetAll),
                get_all_completed_event: completed(Action::GetAll),
            },
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// The Internal channel an action is dispatched on.
    pub fn dispatch_channel(&self, action: Action) -> &str {
        let i = &self.internal;
        match action {
            Action::Create => &i.create_event,
            Action::Update => &i.update_event,
            Action::Delete => &i.delete_event,
            Action::GetSingle => &i.get_single_event,
            Action::GetAll => &i.get_all_event,
        }
    }

    /// The Internal channel a handler emits an action's completion on.
    pub fn completion_channel(&self, action: Action) -> &str {
        let i = &self.internal;
        match action {
            Action::Create => &i.create_completed_event,
            Action::Update => &i.update_completed_event,
            Action::Delete => &i.delete_completed_event,
            Action::GetSingle => &i.get_single_completed_event,
            Action::GetAll => &i.get_all_completed_event,
        }
    }

    /// All five completion channels paired with their action.
    pub fn completion_channels(&self) -> [(Action, &str); 5] {
        Action::ALL.map(|a| (a, self.completion_channel(a)))
    }

    /// Every channel name this family owns.
    pub fn channel_names(&self) -> Vec<&str> {
        let mut names = vec![
            self.external.event.as_str(),
            self.external.completed_event.as_str(),
        ];
        for action in Action::ALL {
            names.push(self.dispatch_channel(action));
            names.push(self.completion_channel(action));
        }
        names
    }
}

/// Read-only lookup from family name to [`ChannelDescriptor`].
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    families: BTreeMap<String, ChannelDescriptor>,
}

impl ChannelRegistry {
    /// Build a registry from descriptors, rejecting duplicate channel names.
    pub fn new(
        descriptors: impl IntoIterator<Item = ChannelDescriptor>,
    ) -> Result<Self, ChannelError> {
        let mut families = BTreeMap::new();
        let mut seen = HashSet::new();

        for descriptor in descriptors {
            for name in descriptor.channel_names() {
                if !seen.insert(name.to_string()) {
                    return Err(ChannelError::DuplicateChannel(name.to_string()));
                }
            }
            families.insert(descriptor.family.clone(), descriptor);
        }

        Ok(Self { families })
    }

    /// Build a registry for the given families using conventional names.
    pub fn conventional<I, S>(families: I) -> Result<Self, ChannelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            families
                .into_iter()
                .map(|f| ChannelDescriptor::conventional(f.as_ref())),
        )
    }

    /// Parse a channel document of the form
    /// `{"User": {"External": {...}, "Internal": {...}}}`.
    pub fn from_json_str(json: &str) -> Result<Self, ChannelError> {
        let raw: BTreeMap<String, ChannelDescriptor> =
            serde_json::from_str(json).map_err(|e| ChannelError::Parse(e.to_string()))?;

        Self::new(raw.into_iter().map(|(family, mut descriptor)| {
            descriptor.family = family;
            descriptor
        }))
    }

    /// Read and parse a channel document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ChannelError> {
        let json =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ChannelError::Io(e.to_string()))?;
        Self::from_json_str(&json)
    }

    /// Look up a family's descriptor.
    pub fn descriptor(&self, family: &str) -> Result<&ChannelDescriptor, ChannelError> {
        self.families
            .get(family)
            .ok_or_else(|| ChannelError::UnknownChannelFamily(family.to_string()))
    }

    /// Look up the family whose External request channel is `channel`.
    pub fn descriptor_for_event(&self, channel: &str) -> Result<&ChannelDescriptor, ChannelError> {
        self.families
            .values()
            .find(|d| d.external.event == channel)
            .ok_or_else(|| ChannelError::UnknownChannelFamily(channel.to_string()))
    }

    /// Registered family names, sorted.
    pub fn families(&self) -> Vec<&str> {
        self.families.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, family: &str) -> bool {
        self.families.contains_key(family)
    }
}
