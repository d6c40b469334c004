//! The client half of an SMTP session.

use std::{collections::VecDeque, fmt};

use log::{debug, trace, warn};
use smtp_types::{
    command::{Command, Verb},
    core::{Domain, EhloKeywords, EhloParam},
    envelope::EnvelopeRoute,
    response::Response,
    state::SessionState,
};
use thiserror::Error;

use crate::{
    buffer::Finality,
    codec::{
        decode::{Decoder, ResponseDecodeError},
        encode::Encode,
        ResponseCodec,
    },
    data::DataEncoder,
    transport::Transport,
};

/// Client knobs. All fields have defaults.
#[derive(Debug)]
pub struct ClientConfig {
    /// The default HELO/EHLO argument.
    pub client_domain: Domain,
    pub client_address: Option<String>,
    pub line_length_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_domain: Domain::Name(String::from("localhost")),
            client_address: None,
            line_length_limit: 1000,
        }
    }
}

/// Client-side failures.
///
/// `IllegalState` and `IncompleteLine` are synchronous caller mistakes,
/// reported at the call site and never sent anywhere. The rest surface
/// through [`ClientEngine::take_response`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ClientError {
    #[error("{verb} is not legal in state {state:?}")]
    IllegalState { verb: Verb, state: SessionState },
    #[error("writing mail data is only legal in state {state:?}")]
    NotInData { state: SessionState },
    #[error("mail data ended with incomplete line")]
    IncompleteLine,
    #[error("failed to parse server response: {0}")]
    ParseFailed(String),
    #[error("connection closed before a response arrived")]
    UnexpectedEof,
}

/// Identifies one issued command; redeem it with
/// [`ClientEngine::take_response`] once the server has answered.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RequestHandle(u64);

#[derive(Debug)]
struct PendingRequest {
    id: u64,
    /// `None` for the sentinel that receives the server's greeting.
    command: Option<Command>,
    /// Body to stream once DATA draws a 354.
    body: Option<Vec<u8>>,
    /// Set when this entry was re-queued to await the end-of-data reply.
    awaiting_final: bool,
}

/// The client engine.
///
/// Owns a [`Transport`] and a FIFO queue of pending requests; responses are
/// correlated to requests by position, never by content. The queue starts
/// with one sentinel entry for the server's 220 greeting. Command methods
/// render into the output buffer, push a pending entry, and give the
/// transport one synchronous chance to make progress, so over a blocking
/// stream a plain `while engine.handle_io() {}` after each call behaves like
/// a synchronous client.
pub struct ClientEngine<T> {
    transport: T,
    config: ClientConfig,
    state: SessionState,
    response_codec: ResponseCodec,
    data_encoder: DataEncoder,
    queue: VecDeque<PendingRequest>,
    completed: VecDeque<(u64, Result<Response, ClientError>)>,
    next_id: u64,
    server_greeting: Option<String>,
    server_helo: Option<String>,
    server_ehlo_keywords: EhloKeywords,
}

impl<T: Transport> ClientEngine<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let response_codec = ResponseCodec::new(config.line_length_limit);
        let mut queue = VecDeque::new();
        queue.push_back(PendingRequest {
            id: 0,
            command: None,
            body: None,
            awaiting_final: false,
        });

        Self {
            transport,
            config,
            state: SessionState::Connect,
            response_codec,
            data_encoder: DataEncoder::new(),
            queue,
            completed: VecDeque::new(),
            next_id: 1,
            server_greeting: None,
            server_helo: None,
            server_ehlo_keywords: EhloKeywords::new(),
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

    /// The server's 220 greeting text, lines joined with `\n`.
    pub fn server_greeting(&self) -> Option<&str> {
        self.server_greeting.as_deref()
    }

    /// The domain the server announced in its HELO/EHLO reply.
    pub fn server_helo(&self) -> Option<&str> {
        self.server_helo.as_deref()
    }

    /// Keywords the server advertised in its EHLO reply.
    pub fn server_ehlo_keywords(&self) -> &EhloKeywords {
        &self.server_ehlo_keywords
    }

    /// Commands still waiting for a response (greeting sentinel included).
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Redeem a handle for its response, once it has arrived.
    pub fn take_response(
        &mut self,
        handle: RequestHandle,
    ) -> Option<Result<Response, ClientError>> {
        let position = self
            .completed
            .iter()
            .position(|(id, _)| *id == handle.0)?;

        self.completed.remove(position).map(|(_, result)| result)
    }

    // ----- Command methods ---------------------------------------------------------------------

    pub fn helo(&mut self) -> Result<RequestHandle, ClientError> {
        let domain = self.config.client_domain.clone();
        self.issue(Command::Helo { domain }, None)
    }

    pub fn ehlo(&mut self) -> Result<RequestHandle, ClientError> {
        let domain = self.config.client_domain.clone();
        self.issue(Command::Ehlo { domain }, None)
    }

    pub fn mail_from(&mut self, reverse_path: EnvelopeRoute) -> Result<RequestHandle, ClientError> {
        self.issue(Command::Mail { reverse_path }, None)
    }

    pub fn rcpt_to(&mut self, forward_path: EnvelopeRoute) -> Result<RequestHandle, ClientError> {
        self.issue(Command::Rcpt { forward_path }, None)
    }

    /// Issue DATA; stream the body yourself with [`ClientEngine::write_data`]
    /// and [`ClientEngine::end_data`] once the state reaches `Data`.
    pub fn data(&mut self) -> Result<RequestHandle, ClientError> {
        self.issue(Command::Data, None)
    }

    /// Issue DATA with a preloaded body, stuffed and terminated as soon as
    /// the server answers 354. The handle resolves with the final
    /// end-of-data response.
    pub fn data_with_body(&mut self, body: impl Into<Vec<u8>>) -> Result<RequestHandle, ClientError> {
        self.issue(Command::Data, Some(body.into()))
    }

    pub fn rset(&mut self) -> Result<RequestHandle, ClientError> {
        self.issue(Command::Rset, None)
    }

    pub fn vrfy(&mut self, target: impl Into<String>) -> Result<RequestHandle, ClientError> {
        self.issue(
            Command::Vrfy {
                target: target.into(),
            },
            None,
        )
    }

    pub fn noop(&mut self) -> Result<RequestHandle, ClientError> {
        self.issue(Command::Noop, None)
    }

    pub fn quit(&mut self) -> Result<RequestHandle, ClientError> {
        self.issue(Command::Quit, None)
    }

    fn issue(
        &mut self,
        command: Command,
        body: Option<Vec<u8>>,
    ) -> Result<RequestHandle, ClientError> {
        let verb = command.verb();
        if !verb.is_legal_in(self.state) {
            return Err(ClientError::IllegalState {
                verb,
                state: self.state,
            });
        }

        debug!("C: {} in {:?}", verb, self.state);

        let bytes = command.encode().dump();
        self.transport.output().append(&bytes);

        let id = self.next_id;
        self.next_id += 1;
        self.queue.push_back(PendingRequest {
            id,
            command: Some(command),
            body,
            awaiting_final: false,
        });

        self.handle_io();
        Ok(RequestHandle(id))
    }

    // ----- DATA writer -------------------------------------------------------------------------

    /// Stream a body chunk; only legal in state `Data`.
    ///
    /// Chunks may be fragmented arbitrarily; line terminators and
    /// dot-stuffing come out right regardless of where the boundaries fall.
    pub fn write_data(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        if self.state != SessionState::Data {
            return Err(ClientError::NotInData { state: self.state });
        }

        self.data_encoder.write(bytes, self.transport.output());
        self.transport.flush(false);
        Ok(())
    }

    /// Terminate the body; only legal in state `Data` at a line boundary.
    pub fn end_data(&mut self) -> Result<(), ClientError> {
        if self.state != SessionState::Data {
            return Err(ClientError::NotInData { state: self.state });
        }
        if !self.data_encoder.at_line_start() {
            return Err(ClientError::IncompleteLine);
        }

        self.data_encoder.finish(self.transport.output());
        self.state = SessionState::DataComplete;
        self.transport.flush(false);
        Ok(())
    }

    // ----- Driver ------------------------------------------------------------------------------

    /// Correlate buffered responses to pending requests.
    ///
    /// Returns `true` when any forward progress was made.
    pub fn handle_io(&mut self) -> bool {
        let mut progress = false;

        if !self.queue.is_empty() {
            self.transport.flush(false);
            self.transport.fetch(None);

            while !self.queue.is_empty() {
                let (outcome, consumed) = {
                    let input = self.transport.input();
                    let unread = input.unread();
                    match self.response_codec.decode(unread) {
                        Ok((rest, response)) => (Ok(response), unread.len() - rest.len()),
                        Err(error) => (Err(error), 0),
                    }
                };

                match outcome {
                    Ok(response) => {
                        self.transport.input().advance(consumed);
                        progress = true;

                        trace!("S: {} {}", response.code(), response.lines().join(" / "));

                        let mut entry = match self.queue.pop_front() {
                            Some(entry) => entry,
                            None => break,
                        };

                        let requeued = self.update_state_after_response(&mut entry, &response);
                        if !requeued {
                            self.completed.push_back((entry.id, Ok(response)));
                        }
                    }
                    Err(ResponseDecodeError::Incomplete) => break,
                    Err(ResponseDecodeError::LineTooLong { limit }) => {
                        warn!("response line exceeds {} bytes", limit);
                        self.fail_head(ClientError::ParseFailed(format!(
                            "response line exceeds {} bytes",
                            limit
                        )));
                        progress = true;
                        break;
                    }
                    Err(ResponseDecodeError::Failed { message, discard }) => {
                        self.transport.input().advance(discard);
                        self.fail_head(ClientError::ParseFailed(message));
                        progress = true;
                        break;
                    }
                }
            }
        }

        match self.transport.input_finality() {
            Finality::Eof if self.transport.input().unread_len() == 0 => {
                if self.state != SessionState::Quit && self.state != SessionState::Abort {
                    self.state = SessionState::Abort;
                    progress = true;
                }
                self.fail_all(ClientError::UnexpectedEof);
            }
            Finality::Error(kind) => {
                if self.state != SessionState::Abort {
                    warn!("transport read failed: {:?}", kind);
                    self.state = SessionState::Abort;
                    progress = true;
                }
                self.fail_all(ClientError::UnexpectedEof);
            }
            _ => {}
        }

        self.transport.flush(false);
        progress
    }

    /// A parse failure poisons the head-of-queue request and the session.
    fn fail_head(&mut self, error: ClientError) {
        if let Some(entry) = self.queue.pop_front() {
            self.completed.push_back((entry.id, Err(error)));
        }
        self.state = SessionState::Abort;
    }

    fn fail_all(&mut self, error: ClientError) {
        while let Some(entry) = self.queue.pop_front() {
            self.completed.push_back((entry.id, Err(error.clone())));
        }
    }

    /// Apply the state transition a response causes.
    ///
    /// Returns `true` when the entry was re-queued (a DATA entry whose final
    /// response is still outstanding) and must not be completed yet.
    fn update_state_after_response(
        &mut self,
        entry: &mut PendingRequest,
        response: &Response,
    ) -> bool {
        let code = response.code().as_u16();

        if code == 421 {
            // The server is shutting down on us.
            self.state = SessionState::Quit;
            return false;
        }

        match (&entry.command, code) {
            (None, 220) => {
                self.state = SessionState::Handshake;
                self.server_greeting = Some(response.text());
            }
            (None, 554) => {
                self.state = SessionState::Reject;
                self.server_greeting = Some(response.text());
            }
            (Some(Command::Helo { .. }), 250) => {
                self.server_helo = Some(response.lines()[0].clone());
                self.state = SessionState::Ready;
            }
            (Some(Command::Ehlo { .. }), 250) => {
                self.server_helo = Some(response.lines()[0].clone());
                self.record_ehlo_keywords(response);
                self.state = SessionState::Ready;
            }
            (Some(Command::Mail { .. }), 250) => {
                self.state = SessionState::Mail;
            }
            (Some(Command::Rset), 250) => {
                if self.state == SessionState::Mail {
                    self.state = SessionState::Ready;
                }
            }
            (Some(Command::Data), 354) if self.state == SessionState::Mail => {
                self.state = SessionState::Data;
                self.data_encoder.reset();

                let body = entry.body.take();
                // The entry goes back to the front to correlate the
                // end-of-data reply; it is not dispatched yet.
                self.queue.push_front(PendingRequest {
                    id: entry.id,
                    command: entry.command.clone(),
                    body: None,
                    awaiting_final: true,
                });

                if let Some(body) = body {
                    self.stream_body(&body);
                }

                return true;
            }
            (Some(Command::Data), _) if entry.awaiting_final => {
                self.state = SessionState::Ready;
            }
            (Some(Command::Quit), 221) => {
                self.state = SessionState::Quit;
                // Our half goes down once the output drains.
                self.transport.flush(true);
            }
            _ => {}
        }

        false
    }

    fn stream_body(&mut self, body: &[u8]) {
        self.data_encoder.write(body, self.transport.output());
        if !self.data_encoder.at_line_start() {
            self.data_encoder.write(b"\n", self.transport.output());
        }
        self.data_encoder.finish(self.transport.output());
        self.state = SessionState::DataComplete;
        self.transport.flush(false);
    }

    fn record_ehlo_keywords(&mut self, response: &Response) {
        self.server_ehlo_keywords.clear();

        for line in &response.lines()[1..] {
            let mut words = line.splitn(2, ' ');
            let Some(keyword) = words.next() else {
                continue;
            };
            if keyword.is_empty() {
                continue;
            }

            let param = match words.next() {
                Some(value) => EhloParam::Value(value.to_string()),
                None => EhloParam::Flag,
            };

            self.server_ehlo_keywords
                .insert(keyword.to_ascii_uppercase(), param);
        }
    }
}

impl<T> fmt::Debug for ClientEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClientEngine")
            .field("state", &self.state)
            .field("pending", &self.queue.len())
            .field("completed", &self.completed.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{pipe, BufferedTransport, PipeStream, Stream};

    fn client() -> (
        ClientEngine<BufferedTransport<PipeStream>>,
        BufferedTransport<PipeStream>,
    ) {
        let (client_side, server_side) = pipe();
        let mut config = ClientConfig::default();
        config.client_domain = Domain::Name(String::from("client.example.com"));
        (ClientEngine::new(client_side, config), server_side)
    }

    fn respond(peer: &mut BufferedTransport<PipeStream>, bytes: &[u8]) {
        peer.output().append(bytes);
        peer.flush(false);
    }

    fn sent(peer: &mut BufferedTransport<PipeStream>) -> Vec<u8> {
        peer.fetch(None);
        let bytes = peer.input().unread().to_vec();
        let n = bytes.len();
        peer.input().advance(n);
        bytes
    }

    #[test]
    fn test_greeting_then_ehlo() {
        let (mut client, mut peer) = client();

        // Commands are refused until the greeting arrived.
        assert_eq!(
            Err(ClientError::IllegalState {
                verb: Verb::Ehlo,
                state: SessionState::Connect,
            }),
            client.ehlo().map(|_| ()),
        );

        respond(&mut peer, b"220 example.com ready\r\n");
        assert!(client.handle_io());
        assert_eq!(SessionState::Handshake, client.state());
        assert_eq!(Some("example.com ready"), client.server_greeting());

        let handle = client.ehlo().unwrap();
        assert_eq!(b"EHLO client.example.com\r\n".as_ref(), sent(&mut peer).as_slice());

        respond(&mut peer, b"250-example.com\r\n250-PIPELINING\r\n250 SIZE 10485760\r\n");
        client.handle_io();

        assert_eq!(SessionState::Ready, client.state());
        assert_eq!(Some("example.com"), client.server_helo());
        assert_eq!(
            Some(&EhloParam::Flag),
            client.server_ehlo_keywords().get("PIPELINING")
        );
        assert_eq!(
            Some(&EhloParam::Value(String::from("10485760"))),
            client.server_ehlo_keywords().get("SIZE")
        );

        let response = client.take_response(handle).unwrap().unwrap();
        assert_eq!(250, response.code().as_u16());
        assert_eq!(
            vec!["example.com", "PIPELINING", "SIZE 10485760"],
            response.lines().to_vec()
        );
    }

    #[test]
    fn test_responses_fire_in_fifo_order() {
        let (mut client, mut peer) = client();
        respond(&mut peer, b"220 hi\r\n");
        client.handle_io();
        let h1 = client.ehlo().unwrap();
        respond(&mut peer, b"250 example.com\r\n");
        client.handle_io();

        let h2 = client.noop().unwrap();
        let h3 = client.noop().unwrap();
        respond(&mut peer, b"250 one\r\n250 two\r\n");
        client.handle_io();

        assert_eq!("example.com", client.take_response(h1).unwrap().unwrap().text());
        assert_eq!("one", client.take_response(h2).unwrap().unwrap().text());
        assert_eq!("two", client.take_response(h3).unwrap().unwrap().text());
    }

    #[test]
    fn test_preloaded_data_streams_after_354() {
        let (mut client, mut peer) = client();
        respond(&mut peer, b"220 hi\r\n");
        client.handle_io();
        client.ehlo().unwrap();
        respond(&mut peer, b"250 example.com\r\n");
        client.handle_io();
        client.mail_from(EnvelopeRoute::null()).unwrap();
        respond(&mut peer, b"250 OK\r\n");
        client.handle_io();
        client
            .rcpt_to(EnvelopeRoute::address("x", Domain::name("y.example").unwrap()).unwrap())
            .unwrap();
        respond(&mut peer, b"250 OK\r\n");
        client.handle_io();
        sent(&mut peer);

        let handle = client
            .data_with_body(&b"Hello\n.dotted\n"[..])
            .unwrap();
        assert_eq!(b"DATA\r\n".as_ref(), sent(&mut peer).as_slice());

        respond(&mut peer, b"354 go ahead\r\n");
        client.handle_io();
        assert_eq!(SessionState::DataComplete, client.state());
        assert_eq!(
            b"Hello\r\n..dotted\r\n.\r\n".as_ref(),
            sent(&mut peer).as_slice()
        );

        // The 354 is not delivered; the final response is.
        assert!(client.take_response(handle).is_none());
        respond(&mut peer, b"250 Accepted\r\n");
        client.handle_io();
        assert_eq!(SessionState::Ready, client.state());
        assert_eq!(
            "Accepted",
            client.take_response(handle).unwrap().unwrap().text()
        );
    }

    #[test]
    fn test_manual_data_writer() {
        let (mut client, mut peer) = client();
        respond(&mut peer, b"220 hi\r\n");
        client.handle_io();
        client.helo().unwrap();
        respond(&mut peer, b"250 example.com\r\n");
        client.handle_io();
        client.mail_from(EnvelopeRoute::null()).unwrap();
        respond(&mut peer, b"250 OK\r\n");
        client.handle_io();
        client
            .rcpt_to(EnvelopeRoute::address("x", Domain::name("y.example").unwrap()).unwrap())
            .unwrap();
        respond(&mut peer, b"250 OK\r\n");
        client.handle_io();

        assert!(matches!(
            client.write_data(b"early"),
            Err(ClientError::NotInData { .. })
        ));

        let handle = client.data().unwrap();
        respond(&mut peer, b"354 go ahead\r\n");
        client.handle_io();
        assert_eq!(SessionState::Data, client.state());
        sent(&mut peer);

        client.write_data(b"Foo\n.Line starting with dot\n").unwrap();
        client.write_data(b"split ").unwrap();
        client.write_data(b"line\n").unwrap();
        client.end_data().unwrap();

        assert_eq!(
            b"Foo\r\n..Line starting with dot\r\nsplit line\r\n.\r\n".as_ref(),
            sent(&mut peer).as_slice()
        );

        respond(&mut peer, b"250 Accepted\r\n");
        client.handle_io();
        assert_eq!(SessionState::Ready, client.state());
        assert_eq!(
            "Accepted",
            client.take_response(handle).unwrap().unwrap().text()
        );
    }

    #[test]
    fn test_end_data_requires_line_boundary() {
        let (mut client, mut peer) = client();
        respond(&mut peer, b"220 hi\r\n");
        client.handle_io();
        client.helo().unwrap();
        respond(&mut peer, b"250 d\r\n");
        client.handle_io();
        client.mail_from(EnvelopeRoute::null()).unwrap();
        respond(&mut peer, b"250 OK\r\n");
        client.handle_io();
        client
            .rcpt_to(EnvelopeRoute::address("x", Domain::name("y.example").unwrap()).unwrap())
            .unwrap();
        respond(&mut peer, b"250 OK\r\n");
        client.handle_io();
        client.data().unwrap();
        respond(&mut peer, b"354 ok\r\n");
        client.handle_io();

        client.write_data(b"no terminator").unwrap();
        assert_eq!(Err(ClientError::IncompleteLine), client.end_data());

        client.write_data(b"\n").unwrap();
        client.end_data().unwrap();
    }

    #[test]
    fn test_quit_closes_write_half() {
        let (mut client, mut peer) = client();
        respond(&mut peer, b"220 hi\r\n");
        client.handle_io();

        let handle = client.quit().unwrap();
        respond(&mut peer, b"221 Goodbye\r\n");
        client.handle_io();

        assert_eq!(SessionState::Quit, client.state());
        assert_eq!(
            "Goodbye",
            client.take_response(handle).unwrap().unwrap().text()
        );
        assert_eq!(Finality::Eof, client.transport().output_finality());
    }

    #[test]
    fn test_421_forces_quit() {
        let (mut client, mut peer) = client();
        respond(&mut peer, b"220 hi\r\n");
        client.handle_io();

        let handle = client.ehlo().unwrap();
        respond(&mut peer, b"421 going down\r\n");
        client.handle_io();

        assert_eq!(SessionState::Quit, client.state());
        let response = client.take_response(handle).unwrap().unwrap();
        assert_eq!(421, response.code().as_u16());
    }

    #[test]
    fn test_parse_failure_aborts() {
        let (mut client, mut peer) = client();
        respond(&mut peer, b"garbage\r\n");
        client.handle_io();

        assert_eq!(SessionState::Abort, client.state());
    }

    #[test]
    fn test_rejecting_greeting_allows_only_quit() {
        let (mut client, mut peer) = client();
        respond(&mut peer, b"554 no service\r\n");
        client.handle_io();

        assert_eq!(SessionState::Reject, client.state());
        assert!(client.ehlo().is_err());
        assert!(client.quit().is_ok());
    }

    #[test]
    fn test_eof_fails_pending_requests() {
        let (mut client, mut peer) = client();
        respond(&mut peer, b"220 hi\r\n");
        client.handle_io();

        let handle = client.ehlo().unwrap();
        peer.stream_mut().shutdown_write().unwrap();
        client.handle_io();

        assert_eq!(SessionState::Abort, client.state());
        assert_eq!(
            Some(Err(ClientError::UnexpectedEof)),
            client.take_response(handle)
        );
    }
}
