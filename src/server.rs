//! The server half of an SMTP session.

use std::fmt;

use log::{debug, trace, warn};
use smtp_types::{
    command::{Command, Verb, VerbSet},
    core::{Domain, EhloKeywords, ReplyCode},
    response::Response,
    state::SessionState,
};

use crate::{
    buffer::Finality,
    codec::{
        decode::{CommandDecodeError, Decoder},
        encode::Encode,
        CommandCodec,
    },
    data::DataDecoder,
    transaction::{BodySink, Transaction},
    transport::Transport,
};

/// Listener invoked after HELO/EHLO is accepted and recorded, before the
/// reply is rendered. Returning a response overrides the default 250.
pub type HandshakeListener = Box<dyn FnMut(Verb, &Domain) -> Option<Response>>;

/// Handler invoked with the completed transaction once the end-of-data
/// terminator has been seen. Its response decides the fate of the message.
pub type TransactionHandler = Box<dyn FnMut(&mut Transaction) -> Response>;

/// Server knobs. All fields have defaults.
#[derive(Debug)]
pub struct ServerConfig {
    /// Text of the 220 greeting. `None` derives one from `server_domain`.
    pub greeting: Option<String>,
    /// When set, the greeting is `554` with this text and the session only
    /// accepts QUIT.
    pub reject_greeting: Option<String>,
    pub server_domain: String,
    pub server_address: Option<String>,
    /// Domain announced in the 250 reply to HELO/EHLO. `None` falls back to
    /// `server_domain`.
    pub server_helo: Option<String>,
    pub client_domain: Option<String>,
    pub client_address: Option<String>,
    /// Keywords advertised in the multi-line EHLO reply, ordered by keyword.
    pub ehlo_keywords: EhloKeywords,
    pub line_length_limit: usize,
    pub message_size_limit: u64,
    pub recipient_limit: usize,
    /// Bytes a transaction body may hold in memory before spilling to disk.
    pub body_spill_threshold: usize,
    /// The verbs this session speaks; see [`VerbSet::base`].
    pub verbs: VerbSet,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            greeting: None,
            reject_greeting: None,
            server_domain: String::from("localhost"),
            server_address: None,
            server_helo: None,
            client_domain: None,
            client_address: None,
            ehlo_keywords: EhloKeywords::new(),
            line_length_limit: 1000,
            message_size_limit: 10 * 1024 * 1024,
            recipient_limit: 1024,
            body_spill_threshold: 256 * 1024,
            verbs: VerbSet::base(),
        }
    }
}

/// The server engine.
///
/// Owns a [`Transport`] and drives the whole session from repeated
/// [`ServerEngine::handle_io`] calls: it parses commands from the input
/// buffer, dispatches them by state, renders replies into the output buffer,
/// and switches in and out of DATA mode. It performs no I/O beyond
/// `fetch`/`flush` on its transport.
pub struct ServerEngine<T> {
    transport: T,
    config: ServerConfig,
    state: SessionState,
    command_codec: CommandCodec,
    data_decoder: DataDecoder,
    client_helo: Option<(Verb, Domain)>,
    transaction: Option<Transaction>,
    discard_to_eol: bool,
    oversized: bool,
    sink_failed: bool,
    on_handshake: Option<HandshakeListener>,
    on_transaction: Option<TransactionHandler>,
}

impl<T: Transport> ServerEngine<T> {
    pub fn new(transport: T, config: ServerConfig) -> Self {
        let command_codec = CommandCodec::new(config.line_length_limit, config.verbs);

        Self {
            transport,
            config,
            state: SessionState::Connect,
            command_codec,
            data_decoder: DataDecoder::new(),
            client_helo: None,
            transaction: None,
            discard_to_eol: false,
            oversized: false,
            sink_failed: false,
            on_handshake: None,
            on_transaction: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The domain the client announced, if the handshake happened.
    pub fn client_helo(&self) -> Option<&Domain> {
        self.client_helo.as_ref().map(|(_, domain)| domain)
    }

    /// The transaction in progress, if MAIL has been accepted.
    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    pub fn set_on_handshake(&mut self, listener: HandshakeListener) {
        self.on_handshake = Some(listener);
    }

    pub fn set_on_transaction(&mut self, handler: TransactionHandler) {
        self.on_transaction = Some(handler);
    }

    /// Drive the session as far as the buffered bytes allow.
    ///
    /// Re-entrant: call it whenever new bytes may have arrived (or, on a
    /// blocking transport, in a plain loop). Returns `true` when any forward
    /// progress was made, so a driver can drain work deterministically.
    pub fn handle_io(&mut self) -> bool {
        let mut progress = false;

        if self.state == SessionState::Connect {
            let (next_state, response) = match &self.config.reject_greeting {
                Some(text) => (
                    SessionState::Reject,
                    Response::with_code(ReplyCode::TRANSACTION_FAILED, text),
                ),
                None => {
                    let text = self.config.greeting.clone().unwrap_or_else(|| {
                        format!("smtp-toolkit server on {}", self.config.server_domain)
                    });
                    (
                        SessionState::Handshake,
                        Response::with_code(ReplyCode::SERVICE_READY, text),
                    )
                }
            };

            trace!("greeting sent, entering {:?}", next_state);
            self.state = next_state;
            self.send_response(&response);
            progress = true;
        }

        self.transport.fetch(None);

        loop {
            if matches!(self.state, SessionState::Quit | SessionState::Abort) {
                break;
            }

            if self.state == SessionState::Data {
                let (advanced, done) = self.read_data();
                progress |= advanced;
                if done {
                    continue;
                }
                break;
            }

            if self.discard_to_eol {
                let consumed = {
                    let unread = self.transport.input().unread();
                    match unread.iter().position(|b| *b == b'\n') {
                        Some(position) => {
                            self.discard_to_eol = false;
                            position + 1
                        }
                        None => unread.len(),
                    }
                };
                self.transport.input().advance(consumed);

                if self.discard_to_eol {
                    break;
                }
                continue;
            }

            let (outcome, consumed) = {
                let input = self.transport.input();
                let unread = input.unread();
                match self.command_codec.decode(unread) {
                    Ok((rest, command)) => (Ok(command), unread.len() - rest.len()),
                    Err(error) => (Err(error), 0),
                }
            };

            match outcome {
                Ok(command) => {
                    self.transport.input().advance(consumed);
                    self.dispatch(command);
                    progress = true;
                }
                Err(CommandDecodeError::Incomplete) => break,
                Err(CommandDecodeError::LineTooLong { limit }) => {
                    warn!("command line exceeds {} bytes", limit);
                    self.send_response(&Response::with_code(
                        ReplyCode::SYNTAX_ERROR,
                        "Line too long",
                    ));
                    self.discard_to_eol = true;
                    progress = true;
                }
                Err(CommandDecodeError::Failed { reply, discard }) => {
                    self.transport.input().advance(discard);
                    let code =
                        ReplyCode::try_from(reply.code).unwrap_or(ReplyCode::SYNTAX_ERROR);
                    self.send_response(&Response::with_code(code, &reply.message));
                    progress = true;
                }
            }
        }

        match self.transport.input_finality() {
            Finality::Eof
                if !matches!(self.state, SessionState::Quit | SessionState::Abort) =>
            {
                self.send_response(&Response::with_code(
                    ReplyCode::BAD_SEQUENCE,
                    "Unexpected EOF, terminating connection",
                ));
                self.transaction = None;
                self.state = SessionState::Abort;
                progress = true;
            }
            Finality::Error(kind)
                if self.state != SessionState::Abort =>
            {
                warn!("transport read failed: {:?}", kind);
                self.transaction = None;
                self.state = SessionState::Abort;
                progress = true;
            }
            _ => {}
        }

        self.transport.flush(false);
        progress
    }

    /// Render a response into the output buffer and flush.
    ///
    /// Two reply codes have side effects here: 354 switches the session into
    /// DATA mode, and 221/421 close the write half once the output drains.
    pub fn send_response(&mut self, response: &Response) {
        trace!("S: {} {}", response.code(), response.lines().join(" / "));

        let bytes = response.encode().dump();
        self.transport.output().append(&bytes);

        let code = response.code().as_u16();
        if code == 354 {
            self.state = SessionState::Data;
        }
        self.transport.flush(code == 221 || code == 421);
    }

    /// Ask the client to go away: 421, then the write half closes.
    pub fn shutdown(&mut self, message: &str) {
        self.state = SessionState::Quit;
        self.send_response(&Response::with_code(ReplyCode::SHUTTING_DOWN, message));
    }

    /// Decode buffered body lines; returns (made progress, left DATA mode).
    fn read_data(&mut self) -> (bool, bool) {
        let mut chunk = Vec::new();
        let done = self
            .data_decoder
            .decode(self.transport.input(), &mut chunk);

        if !chunk.is_empty() {
            if let Some(transaction) = self.transaction.as_mut() {
                if !self.oversized && !self.sink_failed {
                    if transaction.body.len() + chunk.len() as u64
                        > self.config.message_size_limit
                    {
                        self.oversized = true;
                    } else if let Err(error) = transaction.body.append(&chunk) {
                        warn!("body sink failed: {}", error);
                        self.sink_failed = true;
                    }
                }
            }
        }

        if done {
            self.state = SessionState::DataComplete;
            let response = self.end_of_data_response();

            self.transaction = None;
            self.oversized = false;
            self.sink_failed = false;
            self.state = SessionState::Ready;
            self.send_response(&response);
        }

        (done || !chunk.is_empty(), done)
    }

    fn end_of_data_response(&mut self) -> Response {
        if self.oversized {
            return Response::with_code(
                ReplyCode::MESSAGE_TOO_BIG,
                "Message size exceeds administrative limit",
            );
        }

        if self.sink_failed {
            return Response::with_code(ReplyCode::LOCAL_ERROR, "Local error in processing");
        }

        match (&mut self.on_transaction, &mut self.transaction) {
            (Some(handler), Some(transaction)) => handler(transaction),
            _ => Response::with_code(
                ReplyCode::TRANSACTION_FAILED,
                "Message handler not implemented",
            ),
        }
    }

    fn dispatch(&mut self, command: Command) {
        let verb = command.verb();
        debug!("C: {} in {:?}", verb, self.state);

        if !verb.is_legal_in(self.state) {
            self.send_response(&Response::with_code(
                ReplyCode::BAD_SEQUENCE,
                "Bad sequence of commands",
            ));
            return;
        }

        match command {
            Command::Helo { domain } => self.handle_helo(Verb::Helo, domain),
            Command::Ehlo { domain } => self.handle_helo(Verb::Ehlo, domain),
            Command::Mail { reverse_path } => self.handle_mail(reverse_path),
            Command::Rcpt { forward_path } => {
                let response = match self.transaction.as_mut() {
                    Some(transaction)
                        if transaction.forward_paths.len() >= self.config.recipient_limit =>
                    {
                        Response::with_code(
                            ReplyCode::TOO_MANY_RECIPIENTS,
                            "Too many recipients",
                        )
                    }
                    Some(transaction) => {
                        transaction.forward_paths.push(forward_path);
                        Response::with_code(ReplyCode::OK, "OK")
                    }
                    None => Response::with_code(
                        ReplyCode::BAD_SEQUENCE,
                        "Bad sequence of commands",
                    ),
                };
                self.send_response(&response);
            }
            Command::Data => {
                let has_recipients = self
                    .transaction
                    .as_ref()
                    .is_some_and(|transaction| !transaction.forward_paths.is_empty());

                if has_recipients {
                    self.send_response(&Response::with_code(
                        ReplyCode::START_MAIL_INPUT,
                        "Start mail input; end with <CRLF>.<CRLF>",
                    ));
                } else {
                    self.send_response(&Response::with_code(
                        ReplyCode::TRANSACTION_FAILED,
                        "No valid recipients",
                    ));
                }
            }
            Command::Rset => {
                self.transaction = None;
                if self.state == SessionState::Mail {
                    self.state = SessionState::Ready;
                }
                self.send_response(&Response::with_code(ReplyCode::OK, "OK"));
            }
            Command::Noop => {
                self.send_response(&Response::with_code(ReplyCode::OK, "OK"));
            }
            Command::Vrfy { .. } => {
                self.send_response(&Response::with_code(
                    ReplyCode::CANNOT_VRFY,
                    "Cannot VRFY user, but will accept message and attempt delivery",
                ));
            }
            Command::Quit => {
                self.transaction = None;
                self.state = SessionState::Quit;
                self.send_response(&Response::with_code(
                    ReplyCode::CLOSING_CHANNEL,
                    "Goodbye",
                ));
            }
        }
    }

    fn handle_helo(&mut self, verb: Verb, domain: Domain) {
        self.transaction = None;
        self.client_helo = Some((verb, domain));

        let override_response = match (&mut self.on_handshake, &self.client_helo) {
            (Some(listener), Some((verb, domain))) => listener(*verb, domain),
            _ => None,
        };

        let response = override_response.unwrap_or_else(|| {
            let mut text = self.server_helo_domain().to_string();

            if verb == Verb::Ehlo {
                for (keyword, param) in &self.config.ehlo_keywords {
                    text.push('\n');
                    text.push_str(keyword);
                    if let Some(value) = param.text() {
                        text.push(' ');
                        text.push_str(&value);
                    }
                }
            }

            Response::with_code(ReplyCode::OK, text)
        });

        if response.code().is_positive() {
            self.state = SessionState::Ready;
        }
        self.send_response(&response);
    }

    fn handle_mail(&mut self, reverse_path: smtp_types::envelope::EnvelopeRoute) {
        let mut transaction = Transaction::new(
            reverse_path,
            BodySink::with_threshold(self.config.body_spill_threshold),
        );
        transaction.server_helo = Some(self.server_helo_domain().to_string());
        transaction.server_ehlo_keywords = self.config.ehlo_keywords.clone();
        transaction.server_domain = Some(self.config.server_domain.clone());
        transaction.server_address = self.config.server_address.clone();
        transaction.client_helo = self
            .client_helo
            .as_ref()
            .map(|(_, domain)| domain.to_string());
        transaction.client_domain = self.config.client_domain.clone();
        transaction.client_address = self.config.client_address.clone();

        self.transaction = Some(transaction);
        self.state = SessionState::Mail;
        self.send_response(&Response::with_code(ReplyCode::OK, "OK"));
    }

    fn server_helo_domain(&self) -> &str {
        self.config
            .server_helo
            .as_deref()
            .unwrap_or(&self.config.server_domain)
    }
}

impl<T> fmt::Debug for ServerEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ServerEngine")
            .field("state", &self.state)
            .field("client_helo", &self.client_helo)
            .field("transaction", &self.transaction.is_some())
            .finish_non_exhaustive()
    }
}
