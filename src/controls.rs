//! Identifier encoding at the platform boundary.
//!
//! Every form field and action control the workflow puts on screen carries a
//! string id of the form `<namespace>_button_<action>` (controls) or
//! `<namespace>_<field>` (form fields). The namespace is the draft id, or
//! `<platformSelfId>_<draftId>` for controls on a published artifact, so a
//! press can be attributed without a central dispatch table. Strings exist
//! only here; the rest of the crate works with typed actions.

use crate::model::DraftId;

const BUTTON_DELIMITER: &str = "_button_";

/// A closed set of actions a subscription can dispatch.
pub trait ControlAction: Copy + Send + Sync + std::fmt::Debug + 'static {
    /// Every action, in display order.
    const ALL: &'static [Self];

    /// Which control set this is, for logs and metrics.
    const KIND: &'static str;

    /// Suffix used in the encoded id.
    fn name(self) -> &'static str;

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.name() == name)
    }
}

/// Buttons under a draft preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewAction {
    Edit,
    AddImage,
    Save,
    Finish,
    Cancel,
}

impl ControlAction for ReviewAction {
    const ALL: &'static [Self] = &[
        ReviewAction::Edit,
        ReviewAction::AddImage,
        ReviewAction::Save,
        ReviewAction::Finish,
        ReviewAction::Cancel,
    ];
    const KIND: &'static str = "review";

    fn name(self) -> &'static str {
        match self {
            ReviewAction::Edit => "edit",
            ReviewAction::AddImage => "addImage",
            ReviewAction::Save => "save",
            ReviewAction::Finish => "finish",
            ReviewAction::Cancel => "cancel",
        }
    }
}

/// Buttons under a published artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttendanceAction {
    Attending,
    NotAttending,
}

impl ControlAction for AttendanceAction {
    const ALL: &'static [Self] = &[AttendanceAction::Attending, AttendanceAction::NotAttending];
    const KIND: &'static str = "attendance";

    fn name(self) -> &'static str {
        match self {
            AttendanceAction::Attending => "attending",
            AttendanceAction::NotAttending => "notAttending",
        }
    }
}

/// Namespace of a draft's review controls and form fields.
pub fn review_namespace(draft_id: DraftId) -> String {
    draft_id.to_string()
}

/// Namespace of a published artifact's attendance controls.
pub fn attendance_namespace(platform_self_id: &str, draft_id: DraftId) -> String {
    format!("{platform_self_id}_{draft_id}")
}

pub fn encode<A: ControlAction>(namespace: &str, action: A) -> String {
    format!("{namespace}{BUTTON_DELIMITER}{}", action.name())
}

/// Decode a raw control id. Returns None for ids outside `namespace` or with
/// an unknown action suffix; both are ignored by subscriptions.
pub fn decode<A: ControlAction>(namespace: &str, raw: &str) -> Option<A> {
    let suffix = raw
        .strip_prefix(namespace)?
        .strip_prefix(BUTTON_DELIMITER)?;
    A::from_name(suffix)
}

/// Id of a form field inside a draft's namespace.
pub fn field_id(namespace: &str, field: &str) -> String {
    format!("{namespace}_{field}")
}
