//! CDP wire message types.
//!
//! Internal module defining the request/response envelope, typed command
//! enums, and event payload structures for the slice of the Chrome
//! DevTools Protocol this crate speaks.

mod command;
mod event;
mod message;

pub use command::{CdpCommand, PageCommand, RuntimeCommand};
pub use event::{
    BindingCalled, ConsoleApiCalled, ExceptionThrown, ExecutionContextCreated, CONSOLE_TYPE_DEBUG,
};
pub use message::{
    CdpError, CdpEvent, CdpRequest, CdpResponse, EvaluateReturn, ExceptionDetails,
    ExecutionContextDescription, GetPropertiesReturn, IncomingMessage, InternalPropertyDescriptor,
    RemoteObject,
};
