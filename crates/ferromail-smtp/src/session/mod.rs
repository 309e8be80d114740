//! The SMTP submission state machine.
//!
//! [`Session`] owns no socket. The transport (any transport) drives it
//! with events — bytes arrived, a write completed, TLS came up, the
//! connection closed — and drains [`Action`]s telling it what to do
//! next. All protocol decisions live here; all I/O lives in the caller.
//! One session drives exactly one connection, strictly
//! command-at-a-time: a single reply is outstanding at any moment.
//!
//! ## Drive loop
//!
//! ```ignore
//! let mut session = Session::new(config, outbox);
//! session.submit(MessageId(1), false)?;
//!
//! while let Some(action) = session.poll_action() {
//!     match action {
//!         Action::Connect { host, port, .. } => { /* open the socket */ }
//!         Action::Send(bytes) => { /* write, then session.on_send_complete() */ }
//!         Action::UpgradeTls => { /* handshake, then session.on_tls_upgraded(ok) */ }
//!         Action::Event(event) => { /* observe */ }
//!         Action::Close => break,
//!     }
//! }
//! ```

use std::collections::VecDeque;

use crate::auth::{self, AuthPolicy, TriedSet, sasl};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{self, Parsed};
use crate::stuffing::{self, Carry};
use crate::types::{
    Address, AuthMechanism, MessageId, MessageSource, OutboundMessage, QueuedMessage, ReplyCode,
    ServerCaps,
};

mod queue;
pub use queue::MessageQueue;

/// Well-known implicit-TLS submission port.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Default body bytes drawn per content chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Transport security for the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Security {
    /// Plain connection, no TLS.
    None,
    /// Plain connection upgraded with STARTTLS. Required, not
    /// opportunistic: a server without the capability fails the session.
    #[default]
    StartTls,
    /// TLS from the first byte (implicit TLS).
    Tls,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server hostname.
    pub host: String,
    /// Server port. Port 465 implies implicit TLS regardless of
    /// `security`.
    pub port: u16,
    /// Transport security policy.
    pub security: Security,
    /// Name announced in EHLO/HELO.
    pub client_name: String,
    /// Authentication policy.
    pub auth: AuthPolicy,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
    /// Try LOGIN before a fixed PLAIN policy; some servers advertise
    /// PLAIN they cannot complete.
    pub prefer_login_for_plain: bool,
    /// Body bytes drawn per content chunk.
    pub chunk_size: usize,
}

impl SessionConfig {
    /// Creates a new session configuration.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            security: Security::default(),
            client_name: "localhost".to_string(),
            auth: AuthPolicy::default(),
            username: String::new(),
            password: String::new(),
            prefer_login_for_plain: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Sets the transport security policy.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the name announced in EHLO/HELO.
    #[must_use]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Sets the authentication policy.
    #[must_use]
    pub const fn auth(mut self, policy: AuthPolicy) -> Self {
        self.auth = policy;
        self
    }

    /// Enables the LOGIN-before-PLAIN workaround.
    #[must_use]
    pub const fn prefer_login_for_plain(mut self, enabled: bool) -> Self {
        self.prefer_login_for_plain = enabled;
        self
    }

    /// Sets the content chunk size.
    #[must_use]
    pub const fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }
}

/// Protocol phase: which command the session last issued (or is about
/// to issue) and therefore how the next reply is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not connected, or connected and awaiting the server greeting.
    Idle,
    /// STARTTLS issued, awaiting 220 or the TLS upgrade result.
    StartTls,
    /// HELO issued (fallback for servers that reject EHLO).
    Helo,
    /// EHLO issued.
    Ehlo,
    /// AUTH issued, awaiting the first continuation.
    Auth,
    /// LOGIN username line sent.
    AuthLoginUser,
    /// LOGIN password line sent.
    AuthLoginPass,
    /// PLAIN response sent.
    AuthPlain,
    /// CRAM-MD5 response sent.
    AuthCramMd5,
    /// MAIL FROM issued.
    Mail,
    /// RCPT TO issued.
    Rcpt,
    /// DATA issued.
    Data,
    /// Streaming message content.
    Content,
    /// RSET issued to abort the current message.
    Rset,
    /// QUIT issued.
    Quit,
}

/// Why the transport closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed locally on purpose.
    Clean,
    /// The server dropped an established connection.
    Dropped,
    /// The server could not be reached at all.
    Unreachable,
}

/// Observational event for the caller. Purely informative; feeding one
/// back into the session is neither needed nor possible.
#[derive(Debug)]
pub enum SessionEvent {
    /// A message was accepted into the queue.
    Queued {
        /// Message identifier.
        id: MessageId,
    },
    /// The server accepted the message content.
    Sent {
        /// Message identifier.
        id: MessageId,
    },
    /// A message failed; the session moves on to the next one.
    Failed {
        /// Message identifier.
        id: MessageId,
        /// Classified failure.
        error: Error,
    },
    /// Body streaming progress for the in-flight message.
    Progress {
        /// Message identifier.
        id: MessageId,
        /// Body bytes handed to the transport so far.
        sent: usize,
        /// Total body length.
        total: usize,
    },
    /// The server rejected the credentials; the session quits and the
    /// caller should obtain new credentials and resubmit.
    CredentialsRequested {
        /// Verbatim server reply text.
        server_text: String,
    },
    /// A failure that ends the whole session, not just one message.
    ConnectionFailed {
        /// Classified failure.
        error: Error,
    },
    /// The session is over.
    Finished {
        /// Messages delivered during the session.
        sent: u32,
    },
}

/// Instruction for the transport, drained via [`Session::poll_action`].
#[derive(Debug)]
pub enum Action {
    /// Open a connection.
    Connect {
        /// Server hostname.
        host: String,
        /// Server port.
        port: u16,
        /// Negotiate TLS from the first byte.
        implicit_tls: bool,
    },
    /// Write these bytes, then call [`Session::on_send_complete`].
    Send(Vec<u8>),
    /// Upgrade to TLS in place, then call [`Session::on_tls_upgraded`].
    UpgradeTls,
    /// Close the connection.
    Close,
    /// Observational event.
    Event(SessionEvent),
}

/// The message currently being transferred: detached envelope snapshot,
/// recipient cursors and body streaming state.
#[derive(Debug)]
struct ActiveMessage {
    handle: QueuedMessage,
    sender: Option<Address>,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    to_cursor: usize,
    cc_cursor: usize,
    bcc_cursor: usize,
    body: Vec<u8>,
    offset: usize,
    carry: Carry,
    terminator_sent: bool,
    successful_rcpts: u32,
    failed: bool,
}

impl ActiveMessage {
    fn new(handle: QueuedMessage, message: OutboundMessage) -> Self {
        Self {
            handle,
            sender: message.sender,
            to: message.to,
            cc: message.cc,
            bcc: message.bcc,
            to_cursor: 0,
            cc_cursor: 0,
            bcc_cursor: 0,
            body: message.body,
            offset: 0,
            carry: Carry::new(),
            terminator_sent: false,
            successful_rcpts: 0,
            failed: false,
        }
    }

    /// Pulls one recipient, To before Cc before Bcc.
    fn next_recipient(&mut self) -> Option<Address> {
        if self.to_cursor < self.to.len() {
            self.to_cursor += 1;
            return Some(self.to[self.to_cursor - 1].clone());
        }
        if self.cc_cursor < self.cc.len() {
            self.cc_cursor += 1;
            return Some(self.cc[self.cc_cursor - 1].clone());
        }
        if self.bcc_cursor < self.bcc.len() {
            self.bcc_cursor += 1;
            return Some(self.bcc[self.bcc_cursor - 1].clone());
        }
        None
    }

    fn recipients_exhausted(&self) -> bool {
        self.to_cursor >= self.to.len()
            && self.cc_cursor >= self.cc.len()
            && self.bcc_cursor >= self.bcc.len()
    }
}

/// The SMTP submission session.
///
/// Single-threaded and event-driven: every method returns promptly, and
/// protocol progress happens only in response to transport events. See
/// the module docs for the drive loop.
#[derive(Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct Session<M> {
    config: SessionConfig,
    source: M,
    phase: Phase,
    connected: bool,
    secure: bool,
    authenticated: bool,
    sending: bool,
    first_command_after_tls: bool,
    connection_has_failed: bool,
    tls_upgrade_pending: bool,
    caps: ServerCaps,
    reply_buf: Vec<u8>,
    pending_error: Option<Error>,
    auth_current: Option<AuthMechanism>,
    auth_tried: TriedSet,
    challenge: String,
    queue: MessageQueue,
    current: Option<ActiveMessage>,
    actions: VecDeque<Action>,
    sent: u32,
}

impl<M: MessageSource> Session<M> {
    /// Creates an idle session over the given message source.
    #[must_use]
    pub fn new(config: SessionConfig, source: M) -> Self {
        Self {
            config,
            source,
            phase: Phase::Idle,
            connected: false,
            secure: false,
            authenticated: false,
            sending: false,
            first_command_after_tls: false,
            connection_has_failed: false,
            tls_upgrade_pending: false,
            caps: ServerCaps::empty(),
            reply_buf: Vec::new(),
            pending_error: None,
            auth_current: None,
            auth_tried: TriedSet::new(),
            challenge: String::new(),
            queue: MessageQueue::new(),
            current: None,
            actions: VecDeque::new(),
            sent: 0,
        }
    }

    /// Queues a message for transfer and starts sending if idle.
    ///
    /// A message id already queued or currently being sent is ignored.
    /// Never blocks.
    ///
    /// # Errors
    ///
    /// Returns a queue-allocation error if the queue cannot grow; the
    /// session state is unchanged.
    pub fn submit(&mut self, id: MessageId, anonymous: bool) -> Result<()> {
        if self.current.as_ref().is_some_and(|a| a.handle.id == id) {
            tracing::debug!(id = %id, "message already being sent");
            return Ok(());
        }
        if self.queue.push(QueuedMessage { id, anonymous })? {
            self.emit(SessionEvent::Queued { id });
        } else {
            tracing::debug!(id = %id, "message already queued");
        }
        if !self.sending {
            self.start_next_message();
            self.compose();
        }
        Ok(())
    }

    /// Drains the next instruction for the transport.
    pub fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    /// Feeds received bytes into the session.
    ///
    /// Partial replies are buffered; complete replies drive the state
    /// machine, each composing at most one outgoing command.
    pub fn on_bytes(&mut self, bytes: &[u8]) {
        // Hearing anything from the server re-arms the deduplicated
        // unreachable report.
        self.connection_has_failed = false;
        self.first_command_after_tls = false;
        self.reply_buf.extend_from_slice(bytes);

        loop {
            match parser::parse(&self.reply_buf) {
                Parsed::Incomplete => break,
                Parsed::Reply { code, consumed } => {
                    let raw = String::from_utf8_lossy(&self.reply_buf[..consumed]).into_owned();
                    self.reply_buf.drain(..consumed);
                    tracing::debug!(code = %code, phase = ?self.phase, "SMTP reply");

                    self.handle_reply(code, &raw);
                    if !self.connected && matches!(self.phase, Phase::Idle) && !self.sending {
                        // Session tore down; drop anything still buffered.
                        self.reply_buf.clear();
                        break;
                    }
                }
            }
        }
    }

    /// Backpressure hook: the transport finished writing the previous
    /// buffer and can take more. Streams the next content chunk, or the
    /// end-of-data terminator once the body is exhausted. A no-op
    /// outside the content phase.
    pub fn on_send_complete(&mut self) {
        if !matches!(self.phase, Phase::Content) {
            return;
        }
        self.stream_next_chunk();
    }

    /// Reports the result of an [`Action::UpgradeTls`] handshake.
    pub fn on_tls_upgraded(&mut self, ok: bool) {
        self.tls_upgrade_pending = false;
        if ok {
            tracing::debug!("TLS established, re-greeting");
            self.secure = true;
            self.caps = ServerCaps::empty();
            self.first_command_after_tls = true;
            self.phase = Phase::Ehlo;
        } else {
            self.fail_session(Error::tls_unavailable(""));
        }
        self.compose();
    }

    /// Reports that the transport closed on its own: end of stream, a
    /// reset, or a failed connection attempt. Not needed after the
    /// session itself asked for [`Action::Close`].
    ///
    /// An unexpected close mid-command is classified; repeated
    /// unreachable-server reports are deduplicated so an external retry
    /// loop cannot cause a notification storm.
    pub fn on_closed(&mut self, reason: CloseReason) {
        if !self.connected && (!self.sending || matches!(reason, CloseReason::Clean)) {
            return;
        }
        if self.first_command_after_tls {
            tracing::debug!("connection closed immediately after TLS upgrade");
        }

        let error = match reason {
            CloseReason::Unreachable => {
                if self.connection_has_failed {
                    None
                } else {
                    self.connection_has_failed = true;
                    Some(Error::service_unavailable(""))
                }
            }
            CloseReason::Dropped if self.mid_command() => Some(Error::ConnectionDropped),
            CloseReason::Clean | CloseReason::Dropped => None,
        };
        if let Some(error) = error {
            tracing::warn!(error = %error, "connection lost");
            self.emit(SessionEvent::ConnectionFailed { error });
        }

        let sent = self.sent;
        self.reset_link();
        self.emit(SessionEvent::Finished { sent });
    }

    /// Tears the session down.
    ///
    /// Stops drawing body chunks and drops the queue. A clean QUIT is
    /// attempted only while a server reply is outstanding; mid-body the
    /// server would read QUIT as content, so the link is closed
    /// directly instead.
    pub fn shutdown(&mut self) {
        self.queue.clear();
        let streaming = matches!(self.phase, Phase::Content)
            && self
                .current
                .as_ref()
                .is_some_and(|active| !active.terminator_sent);
        self.current = None;
        if self.connected && !streaming {
            self.phase = Phase::Quit;
            self.compose();
            return;
        }
        let was_sending = self.sending;
        let sent = self.sent;
        self.reset_link();
        self.actions.push_back(Action::Close);
        if was_sending {
            self.emit(SessionEvent::Finished { sent });
        }
    }

    /// Current protocol phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns true if the server greeting has been received.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns true if the link is TLS-protected.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    /// Returns true if the session authenticated successfully.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Returns true if a send is in progress.
    #[must_use]
    pub const fn is_sending(&self) -> bool {
        self.sending
    }

    /// Messages delivered so far in this session.
    #[must_use]
    pub const fn sent_count(&self) -> u32 {
        self.sent
    }

    /// Messages waiting behind the current one.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    // ---- reply dispatch ----------------------------------------------

    fn handle_reply(&mut self, code: ReplyCode, raw: &str) {
        match self.phase {
            Phase::Idle => self.on_greeting(code, raw),
            Phase::StartTls => self.on_starttls_reply(code, raw),
            Phase::Helo => self.on_helo_reply(code, raw),
            Phase::Ehlo => self.on_ehlo_reply(code, raw),
            Phase::Auth => self.on_auth_reply(code, raw),
            Phase::AuthLoginUser => self.on_auth_login_user_reply(code, raw),
            Phase::AuthLoginPass | Phase::AuthPlain | Phase::AuthCramMd5 => {
                self.on_auth_response_reply(code, raw);
            }
            Phase::Mail => self.on_mail_reply(code, raw),
            Phase::Rcpt => self.on_rcpt_reply(code, raw),
            Phase::Data => self.on_data_reply(code, raw),
            Phase::Content => self.on_content_reply(code, raw),
            Phase::Rset => self.on_rset_reply(),
            Phase::Quit => self.on_quit_reply(),
        }

        if let Some(error) = self.pending_error.take() {
            if error.is_connection_level() {
                self.fail_session(error);
            } else {
                self.fail_current(error);
            }
        }
        self.compose();
    }

    fn on_greeting(&mut self, code: ReplyCode, raw: &str) {
        match code.as_u16() {
            220 => {
                self.connected = true;
                self.phase = Phase::Ehlo;
            }
            421 => self.pending_error = Some(Error::service_unavailable(raw.trim_end())),
            _ => self.pending_error = Some(Error::protocol(raw.trim_end())),
        }
    }

    fn on_starttls_reply(&mut self, code: ReplyCode, raw: &str) {
        if code == ReplyCode::SERVICE_READY {
            self.tls_upgrade_pending = true;
            self.actions.push_back(Action::UpgradeTls);
        } else {
            // 454 or anything else: the server cannot upgrade.
            self.pending_error = Some(Error::tls_unavailable(raw.trim_end()));
        }
    }

    fn on_helo_reply(&mut self, code: ReplyCode, raw: &str) {
        match code.as_u16() {
            250 => {
                self.caps = ServerCaps::from_reply_text(raw);
                self.phase = Phase::Mail;
            }
            421 => self.pending_error = Some(Error::service_unavailable(raw.trim_end())),
            _ => self.pending_error = Some(Error::protocol(raw.trim_end())),
        }
    }

    fn on_ehlo_reply(&mut self, code: ReplyCode, raw: &str) {
        if code == ReplyCode::OK {
            self.caps = ServerCaps::from_reply_text(raw);
            self.determine_next_command();
        } else {
            // Old server; retry with the basic greeting. Not an error.
            tracing::debug!(code = %code, "EHLO rejected, falling back to HELO");
            self.phase = Phase::Helo;
        }
    }

    fn on_auth_reply(&mut self, code: ReplyCode, raw: &str) {
        match code.as_u16() {
            334 => match self.auth_current {
                Some(AuthMechanism::CramMd5) => {
                    self.challenge = raw.get(4..).unwrap_or("").trim().to_string();
                    self.phase = Phase::AuthCramMd5;
                }
                Some(AuthMechanism::Login) => self.phase = Phase::AuthLoginUser,
                Some(AuthMechanism::Plain) => self.phase = Phase::AuthPlain,
                None => self.pending_error = Some(Error::protocol(raw.trim_end())),
            },
            // Success before any response was sent; accept it.
            235 => {
                self.authenticated = true;
                self.phase = Phase::Mail;
            }
            535 => self.request_credentials(raw),
            _ => {
                tracing::debug!(code = %code, mechanism = ?self.auth_current, "mechanism rejected, trying next");
                self.begin_auth();
            }
        }
    }

    fn on_auth_login_user_reply(&mut self, code: ReplyCode, raw: &str) {
        if code == ReplyCode::AUTH_CONTINUE {
            self.phase = Phase::AuthLoginPass;
        } else {
            self.request_credentials(raw);
        }
    }

    fn on_auth_response_reply(&mut self, code: ReplyCode, raw: &str) {
        if code == ReplyCode::AUTH_SUCCESS {
            tracing::debug!(mechanism = ?self.auth_current, "authenticated");
            self.authenticated = true;
            self.phase = Phase::Mail;
        } else {
            self.request_credentials(raw);
        }
    }

    fn on_mail_reply(&mut self, code: ReplyCode, raw: &str) {
        match code.as_u16() {
            250 => self.phase = Phase::Rcpt,
            421 => self.pending_error = Some(Error::service_unavailable(raw.trim_end())),
            451 | 452 => self.pending_error = Some(Error::server_temporary(raw.trim_end())),
            552 => self.pending_error = Some(Error::server(raw.trim_end())),
            535 => self.request_credentials(raw),
            _ => self.pending_error = Some(Error::protocol(raw.trim_end())),
        }
    }

    fn on_rcpt_reply(&mut self, code: ReplyCode, raw: &str) {
        match code.as_u16() {
            250 | 251 => {
                let exhausted = self.current.as_mut().is_none_or(|active| {
                    active.successful_rcpts += 1;
                    active.recipients_exhausted()
                });
                if exhausted {
                    if let Some(active) = &self.current {
                        tracing::debug!(recipients = active.successful_rcpts, "envelope accepted");
                    }
                    self.phase = Phase::Data;
                }
            }
            421 => self.pending_error = Some(Error::service_unavailable(raw.trim_end())),
            450 | 451 | 452 | 500 | 501 | 550 | 551 | 553 | 571 => {
                self.pending_error = Some(Error::recipient_rejected(raw.trim_end()));
            }
            552 => self.pending_error = Some(Error::server(raw.trim_end())),
            _ => self.pending_error = Some(Error::protocol(raw.trim_end())),
        }
    }

    fn on_data_reply(&mut self, code: ReplyCode, raw: &str) {
        match code.as_u16() {
            354 => self.phase = Phase::Content,
            421 => self.pending_error = Some(Error::service_unavailable(raw.trim_end())),
            451 => self.pending_error = Some(Error::server_temporary(raw.trim_end())),
            _ => self.pending_error = Some(Error::protocol(raw.trim_end())),
        }
    }

    fn on_content_reply(&mut self, code: ReplyCode, raw: &str) {
        match code.as_u16() {
            250 => {
                self.sent += 1;
                if let Some(active) = self.current.take() {
                    tracing::info!(id = %active.handle.id, "message delivered");
                    self.emit(SessionEvent::Sent {
                        id: active.handle.id,
                    });
                }
                self.start_next_message();
            }
            421 => self.pending_error = Some(Error::service_unavailable(raw.trim_end())),
            451 | 452 => self.pending_error = Some(Error::server_temporary(raw.trim_end())),
            552 | 554 => self.pending_error = Some(Error::server(raw.trim_end())),
            _ => self.pending_error = Some(Error::protocol(raw.trim_end())),
        }
    }

    fn on_rset_reply(&mut self) {
        // Whatever the code, the failed message is gone; move on.
        self.current = None;
        self.start_next_message();
    }

    fn on_quit_reply(&mut self) {
        // A message submitted while QUIT was in flight restarts the
        // session; a quit with a message still attached was a failure
        // path, and that message goes back to the queue in `reset_link`
        // to wait for the caller rather than redialing the same failure.
        let restart = self.current.is_none() && !self.queue.is_empty();
        let sent = self.sent;
        self.reset_link();
        self.actions.push_back(Action::Close);
        self.emit(SessionEvent::Finished { sent });
        if restart {
            self.start_next_message();
        }
    }

    // ---- transitions -------------------------------------------------

    /// Decides what follows a successful EHLO: TLS upgrade first if the
    /// policy demands one, then authentication, then the envelope.
    fn determine_next_command(&mut self) {
        if !self.secure && matches!(self.config.security, Security::StartTls) {
            if self.caps.has_starttls() {
                self.phase = Phase::StartTls;
            } else {
                self.fail_session(Error::tls_unavailable(""));
            }
            return;
        }
        if matches!(self.config.auth, AuthPolicy::None)
            || self.config.username.is_empty()
            || self.authenticated
        {
            self.phase = Phase::Mail;
        } else {
            self.begin_auth();
        }
    }

    /// Selects the next mechanism and enters the AUTH phase, or handles
    /// ladder exhaustion.
    fn begin_auth(&mut self) {
        match auth::next_mechanism(
            self.config.auth,
            self.caps,
            self.auth_tried,
            self.config.prefer_login_for_plain,
        ) {
            Some(mechanism) => {
                self.auth_tried.insert(mechanism);
                self.auth_current = Some(mechanism);
                self.phase = Phase::Auth;
            }
            None => match self.config.auth {
                AuthPolicy::Auto => {
                    tracing::debug!("no mechanism left, sending unauthenticated");
                    self.phase = Phase::Mail;
                }
                AuthPolicy::None | AuthPolicy::Fixed(_) => {
                    self.fail_session(Error::AuthUnavailable);
                }
            },
        }
    }

    /// Starts the next queued message, failing ones that cannot be
    /// prepared or that address nobody. Opens the transport if needed,
    /// quits if the queue is drained while connected, idles otherwise.
    fn start_next_message(&mut self) {
        loop {
            let Some(handle) = self.queue.pop() else {
                self.finish_queue_drained();
                return;
            };
            match self.source.prepare(handle.id, handle.anonymous) {
                Err(error) => {
                    tracing::warn!(id = %handle.id, error = %error, "failed to prepare message");
                    self.emit(SessionEvent::Failed {
                        id: handle.id,
                        error,
                    });
                }
                Ok(message) => {
                    if !message.has_recipients() {
                        tracing::warn!(id = %handle.id, "message has no recipients");
                        self.emit(SessionEvent::Failed {
                            id: handle.id,
                            error: Error::NoRecipients,
                        });
                        continue;
                    }
                    self.current = Some(ActiveMessage::new(handle, message));
                    self.sending = true;
                    if self.connected {
                        self.phase = Phase::Mail;
                    } else {
                        self.open_transport();
                    }
                    return;
                }
            }
        }
    }

    fn finish_queue_drained(&mut self) {
        if self.connected {
            self.phase = Phase::Quit;
        } else {
            self.sending = false;
            let sent = self.sent;
            self.emit(SessionEvent::Finished { sent });
        }
    }

    fn open_transport(&mut self) {
        if self.config.host.is_empty() {
            tracing::warn!("no outgoing server configured");
            if let Some(active) = self.current.take() {
                self.emit(SessionEvent::Failed {
                    id: active.handle.id,
                    error: Error::NoServerConfigured,
                });
            }
            self.emit(SessionEvent::ConnectionFailed {
                error: Error::NoServerConfigured,
            });
            self.sending = false;
            return;
        }
        let implicit_tls = matches!(self.config.security, Security::Tls)
            || self.config.port == IMPLICIT_TLS_PORT;
        self.secure = implicit_tls;
        self.phase = Phase::Idle;
        tracing::debug!(
            host = %self.config.host,
            port = self.config.port,
            implicit_tls,
            "connecting"
        );
        self.actions.push_back(Action::Connect {
            host: self.config.host.clone(),
            port: self.config.port,
            implicit_tls,
        });
    }

    /// Surfaces a per-message failure and aborts the transaction with
    /// RSET, keeping the connection for the next message. A failed
    /// message has had its outcome reported, so link teardown will not
    /// return it to the queue.
    fn fail_current(&mut self, error: Error) {
        let failed = self.current.as_mut().map(|active| {
            active.failed = true;
            active.handle.id
        });
        if let Some(id) = failed {
            tracing::warn!(id = %id, error = %error, transient = error.is_transient(), "message failed");
            self.emit(SessionEvent::Failed { id, error });
        } else {
            self.emit(SessionEvent::ConnectionFailed { error });
        }
        self.phase = Phase::Rset;
    }

    /// Surfaces a session-fatal failure and heads for QUIT.
    fn fail_session(&mut self, error: Error) {
        tracing::warn!(error = %error, "session failed");
        self.emit(SessionEvent::ConnectionFailed { error });
        self.phase = Phase::Quit;
    }

    /// Reports rejected credentials and quits; the caller resubmits
    /// after obtaining new ones. The in-flight message is failed so its
    /// outcome is never silent, and it is not requeued: retrying it is
    /// pointless until the credentials change.
    fn request_credentials(&mut self, raw: &str) {
        let text = raw.trim_end().to_string();
        let failed = self.current.as_mut().map(|active| {
            active.failed = true;
            active.handle.id
        });
        if let Some(id) = failed {
            self.emit(SessionEvent::Failed {
                id,
                error: Error::authentication_failed(text.clone()),
            });
        }
        self.emit(SessionEvent::CredentialsRequested { server_text: text });
        self.phase = Phase::Quit;
    }

    /// Resets all link state after the connection ends. Queued messages
    /// survive for a later session, and an in-flight message whose fate
    /// was never reported returns to the queue head; only a message
    /// already failed on this connection goes down with it.
    fn reset_link(&mut self) {
        if let Some(active) = self.current.take() {
            if !active.failed {
                tracing::debug!(id = %active.handle.id, "returning in-flight message to the queue");
                if let Err(error) = self.queue.restore(active.handle) {
                    self.emit(SessionEvent::Failed {
                        id: active.handle.id,
                        error,
                    });
                }
            }
        }
        self.connected = false;
        self.secure = false;
        self.authenticated = false;
        self.sending = false;
        self.first_command_after_tls = false;
        self.tls_upgrade_pending = false;
        self.caps = ServerCaps::empty();
        self.reply_buf.clear();
        self.auth_current = None;
        self.auth_tried = TriedSet::new();
        self.challenge.clear();
        self.sent = 0;
        self.phase = Phase::Idle;
    }

    // ---- composing ---------------------------------------------------

    /// Builds the outgoing bytes for the current phase, if the phase
    /// owes the server a command right now.
    fn compose(&mut self) {
        let command = match self.phase {
            Phase::Idle => None,
            Phase::Ehlo => Some(Command::Ehlo {
                hostname: self.config.client_name.clone(),
            }),
            Phase::Helo => Some(Command::Helo {
                hostname: self.config.client_name.clone(),
            }),
            Phase::StartTls => (!self.tls_upgrade_pending).then_some(Command::StartTls),
            Phase::Auth => self
                .auth_current
                .map(|mechanism| Command::Auth { mechanism }),
            Phase::AuthPlain => Some(Command::AuthResponse {
                payload: sasl::plain_response(&self.config.username, &self.config.password),
            }),
            Phase::AuthLoginUser => Some(Command::AuthResponse {
                payload: sasl::login_username(&self.config.username),
            }),
            Phase::AuthLoginPass => Some(Command::AuthResponse {
                payload: sasl::login_password(&self.config.password),
            }),
            Phase::AuthCramMd5 => {
                match sasl::cram_md5_response(
                    &self.config.username,
                    &self.config.password,
                    &self.challenge,
                ) {
                    Ok(payload) => Some(Command::AuthResponse { payload }),
                    Err(error) => {
                        tracing::warn!(error = %error, "unusable CRAM-MD5 challenge");
                        self.request_credentials(&self.challenge.clone());
                        Some(Command::Quit)
                    }
                }
            }
            Phase::Mail => self.current.as_ref().map(|active| Command::MailFrom {
                from: if active.handle.anonymous {
                    None
                } else {
                    active.sender.clone()
                },
            }),
            Phase::Rcpt => match self.current.as_mut().and_then(ActiveMessage::next_recipient) {
                Some(to) => Some(Command::RcptTo { to }),
                None => {
                    self.phase = Phase::Data;
                    Some(Command::Data)
                }
            },
            Phase::Data => Some(Command::Data),
            Phase::Content => {
                self.stream_next_chunk();
                None
            }
            Phase::Rset => Some(Command::Rset),
            Phase::Quit => Some(Command::Quit),
        };

        if let Some(command) = command {
            let bytes = command.serialize();
            tracing::trace!(bytes = bytes.len(), phase = ?self.phase, "SMTP send");
            self.actions.push_back(Action::Send(bytes));
        }
    }

    /// Streams the next body chunk through the dot-stuffer, or the
    /// terminator once the body is exhausted.
    fn stream_next_chunk(&mut self) {
        let chunk_size = self.config.chunk_size.max(1);
        let Some(active) = self.current.as_mut() else {
            return;
        };
        if active.terminator_sent {
            return;
        }
        if active.offset >= active.body.len() {
            active.terminator_sent = true;
            tracing::trace!("content complete, sending terminator");
            self.actions
                .push_back(Action::Send(stuffing::TERMINATOR.to_vec()));
            return;
        }

        let end = active.body.len().min(active.offset + chunk_size);
        let (stuffed, carry) = stuffing::stuff_chunk(&active.body[active.offset..end], active.carry);
        active.carry = carry;
        active.offset = end;
        let id = active.handle.id;
        let total = active.body.len();
        self.actions.push_back(Action::Send(stuffed));
        self.actions.push_back(Action::Event(SessionEvent::Progress {
            id,
            sent: end,
            total,
        }));
    }

    fn emit(&mut self, event: SessionEvent) {
        self.actions.push_back(Action::Event(event));
    }

    const fn mid_command(&self) -> bool {
        matches!(
            self.phase,
            Phase::Mail
                | Phase::Auth
                | Phase::AuthLoginUser
                | Phase::AuthLoginPass
                | Phase::AuthPlain
                | Phase::AuthCramMd5
        )
    }
}
