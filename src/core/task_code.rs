//! Task codes and the priority classes derived from them.
//!
//! Every code lives in exactly one numeric range, and the range decides the
//! code's [`TaskClass`]. Classes are never reassigned after a task is built.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Priority class, listed in the order the scheduler services them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskClass {
    /// User/session and system lifecycle changes. Preempts everything.
    CriticalChange,
    /// Switching or restarting the active input method.
    SwitchIme,
    /// Latency-sensitive client requests.
    HigherRequest,
    /// Ordinary client requests.
    NormalRequest,
    /// Read-only queries; may run beside a paused task.
    Query,
    /// Input-method lifecycle reports that end pauses.
    Resume,
    /// Resume and timeout signals for the paused task. Never posted by clients.
    Inner,
}

impl TaskClass {
    /// Number of classes.
    pub const COUNT: usize = 7;

    /// All classes in service order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::CriticalChange,
        Self::SwitchIme,
        Self::HigherRequest,
        Self::NormalRequest,
        Self::Query,
        Self::Resume,
        Self::Inner,
    ];

    /// Position of this class in [`TaskClass::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Numeric range of task codes belonging to this class.
    #[must_use]
    pub const fn range(self) -> Range<u32> {
        let start = self.index() as u32 * 100;
        start..start + 100
    }
}

/// Closed set of operations the scheduler accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum TaskCode {
    /// A user session started.
    OnUserStarted = 1,
    /// A user was removed.
    OnUserRemoved = 2,
    /// A user session stopped.
    OnUserStopped = 3,
    /// The screen was unlocked.
    OnScreenUnlocked = 4,
    /// The window manager became available.
    OnWmsConnected = 5,

    /// Switch to another input method or subtype.
    SwitchInputMethod = 101,
    /// An input method was enabled or disabled.
    OnImeEnabledStateChanged = 102,
    /// Package scanning finished after boot.
    OnBundleScanFinished = 103,
    /// The settings data store became ready.
    OnDataShareReady = 104,
    /// Restart the current input method after it died.
    RestartIme = 105,

    /// Bind a client and start input.
    StartInput = 201,
    /// Show the current keyboard.
    ShowCurrentInput = 202,
    /// Hide the current keyboard.
    HideCurrentInput = 203,
    /// Tear down the input session.
    StopInputSession = 204,
    /// Show the keyboard for a specific client.
    ShowInput = 205,
    /// Hide the keyboard for a specific client.
    HideInput = 206,
    /// Client asks for the keyboard to be shown.
    RequestShowInput = 207,
    /// Client asks for the keyboard to be hidden.
    RequestHideInput = 208,

    /// Release a client binding.
    ReleaseInput = 301,
    /// Show the input method picker.
    DisplayOptionalInputMethod = 302,
    /// Update the window the keyboard is attached to.
    SetCallingWindow = 303,
    /// Update which events a client listens to.
    UpdateListenEventFlag = 304,
    /// Input method reports a panel visibility change.
    PanelStatusChange = 305,
    /// Leave the current special input type.
    ExitCurrentInputType = 306,
    /// Forward private data to the input method.
    SendPrivateData = 307,
    /// Input method connects its system command channel.
    ConnectSystemCmd = 308,

    /// Which input method is active.
    GetCurrentInputMethod = 401,
    /// Which subtype is active.
    GetCurrentInputMethodSubtype = 402,
    /// List installed input methods.
    ListInputMethod = 403,
    /// List subtypes of an input method.
    ListInputMethodSubtype = 404,
    /// Whether the caller is the current input method.
    IsCurrentIme = 405,
    /// Whether a panel is shown.
    IsPanelShown = 406,
    /// Security mode of an input method.
    GetSecurityMode = 407,
    /// Whether the caller is the default input method.
    IsDefaultIme = 408,

    /// Input method process connects after starting.
    InitConnect = 501,
    /// Input method hands over its core and agent objects.
    SetCoreAndAgent = 502,
    /// Input method process reports that it stopped.
    OnImeStopped = 503,

    /// Complete the paused task's current wait.
    ResumeWait = 601,
    /// Time out the paused task's current wait.
    ResumeTimeout = 602,
}

impl TaskCode {
    /// Every code, in ascending numeric order.
    pub const ALL: [Self; 39] = [
        Self::OnUserStarted,
        Self::OnUserRemoved,
        Self::OnUserStopped,
        Self::OnScreenUnlocked,
        Self::OnWmsConnected,
        Self::SwitchInputMethod,
        Self::OnImeEnabledStateChanged,
        Self::OnBundleScanFinished,
        Self::OnDataShareReady,
        Self::RestartIme,
        Self::StartInput,
        Self::ShowCurrentInput,
        Self::HideCurrentInput,
        Self::StopInputSession,
        Self::ShowInput,
        Self::HideInput,
        Self::RequestShowInput,
        Self::RequestHideInput,
        Self::ReleaseInput,
        Self::DisplayOptionalInputMethod,
        Self::SetCallingWindow,
        Self::UpdateListenEventFlag,
        Self::PanelStatusChange,
        Self::ExitCurrentInputType,
        Self::SendPrivateData,
        Self::ConnectSystemCmd,
        Self::GetCurrentInputMethod,
        Self::GetCurrentInputMethodSubtype,
        Self::ListInputMethod,
        Self::ListInputMethodSubtype,
        Self::IsCurrentIme,
        Self::IsPanelShown,
        Self::GetSecurityMode,
        Self::IsDefaultIme,
        Self::InitConnect,
        Self::SetCoreAndAgent,
        Self::OnImeStopped,
        Self::ResumeWait,
        Self::ResumeTimeout,
    ];

    /// Numeric wire value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Priority class, from the numeric range the code falls in.
    #[must_use]
    pub fn class(self) -> TaskClass {
        let raw = self.raw();
        TaskClass::ALL
            .into_iter()
            .find(|class| class.range().contains(&raw))
            .unwrap_or(TaskClass::Inner)
    }
}

impl TryFrom<u32> for TaskCode {
    type Error = u32;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::ALL.into_iter().find(|code| code.raw() == raw).ok_or(raw)
    }
}
