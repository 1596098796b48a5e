pub mod effects;
pub mod engine;
pub mod states;

pub use effects::{
    DocumentRenderer, EffectDispatcher, EffectError, InMemoryNotifier, Notifier,
    RecordingDocumentRenderer,
};
pub use engine::{ApprovalStateMachine, TransitionError, TransitionErrorKind, WorkflowRules};
pub use states::{
    DocumentRequest, Effect, NotificationRequest, SpecialApprovalDestination, TransitionOutcome,
};
