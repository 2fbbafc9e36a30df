//! # STS Login State Machine
//!
//! Per-connection state for the text handshake tier. The machine is
//! synchronous: the connection driver parses a request, hands it to
//! [`StsSession::handle`], and writes back whatever [`StsAction`] says.
//!
//! # States
//!
//! ```text
//! None --/Sts/Connect--> Connected --/Auth/LoginStart--> LoginStart
//!                                                           |
//!                                   /Auth/KeyData (proof ok)|
//!                                                           v
//!                                                     Authenticated
//! ```
//!
//! A request that is valid but arrives in the wrong state is answered with
//! `400` and leaves the state untouched. Unknown accounts and failed proofs
//! both get the same bare `401`.

use nexus_accounts::{Account, AccountStore, GameGrant, SessionDirectory};
use nexus_crypto::{SrpChallenge, CIPHER_KEY_LENGTH};
use nexus_protocol::sts_body::{self, XmlBody};
use nexus_protocol::{StsRequest, StsResponse};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const URI_CONNECT: &str = "/Sts/Connect";
pub const URI_PING: &str = "/Sts/Ping";
pub const URI_LOGIN_START: &str = "/Auth/LoginStart";
pub const URI_KEY_DATA: &str = "/Auth/KeyData";
pub const URI_LOGIN_FINISH: &str = "/Auth/LoginFinish";
pub const URI_REQUEST_GAME_TOKEN: &str = "/Auth/RequestGameToken";

const STATUS_BAD_REQUEST: u16 = 400;
const STATUS_UNAUTHORIZED: u16 = 401;
const STATUS_NOT_FOUND: u16 = 404;

/// Location reported by LoginFinish; a single realm is served
const LOCATION_ID: u32 = 0;

/// Where a login connection is in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StsState {
    /// Accepted, nothing received yet
    None,
    /// `/Sts/Connect` received
    Connected,
    /// Salt and server public value sent, waiting for the client proof
    LoginStart,
    /// Proof verified, the stream is encrypted
    Authenticated,
}

/// What the driver must do after a request
#[derive(Debug)]
pub enum StsAction {
    /// Nothing goes back on the wire
    Silent,
    /// Write the response
    Respond(StsResponse),
    /// Write the response in the clear, then key both stream directions
    RespondThenEncrypt {
        response: StsResponse,
        key: [u8; CIPHER_KEY_LENGTH],
    },
}

impl StsAction {
    pub fn response(&self) -> Option<&StsResponse> {
        match self {
            StsAction::Silent => None,
            StsAction::Respond(response) | StsAction::RespondThenEncrypt { response, .. } => Some(response),
        }
    }
}

/// Login progress of one STS connection
pub struct StsSession {
    state: StsState,
    accounts: Arc<dyn AccountStore>,
    directory: Arc<SessionDirectory>,
    /// Account selected by LoginStart
    account: Option<Account>,
    challenge: Option<SrpChallenge>,
    cipher_key: Option<[u8; CIPHER_KEY_LENGTH]>,
}

impl StsSession {
    pub fn new(accounts: Arc<dyn AccountStore>, directory: Arc<SessionDirectory>) -> Self {
        Self {
            state: StsState::None,
            accounts,
            directory,
            account: None,
            challenge: None,
            cipher_key: None,
        }
    }

    pub fn state(&self) -> StsState {
        self.state
    }

    /// The authenticated account, once the proof has been verified
    pub fn account(&self) -> Option<&Account> {
        match self.state {
            StsState::Authenticated => self.account.as_ref(),
            _ => None,
        }
    }

    /// Process one request and advance the state on success
    pub fn handle(&mut self, request: &StsRequest) -> StsAction {
        let seq = request.sequence();
        debug!("STS {} {} in state {:?}", request.method, request.uri, self.state);

        match request.uri.as_str() {
            URI_CONNECT => self.connect(seq),
            URI_PING => StsAction::Silent,
            URI_LOGIN_START => self.login_start(seq, &request.body),
            URI_KEY_DATA => self.key_data(seq, &request.body),
            URI_LOGIN_FINISH => self.login_finish(seq),
            URI_REQUEST_GAME_TOKEN => self.request_game_token(seq),
            other => {
                debug!("Unknown STS uri {}", other);
                error(seq, STATUS_NOT_FOUND)
            }
        }
    }

    fn connect(&mut self, seq: Option<&str>) -> StsAction {
        if self.state != StsState::None {
            return self.wrong_state(seq, URI_CONNECT);
        }
        self.state = StsState::Connected;
        StsAction::Silent
    }

    fn login_start(&mut self, seq: Option<&str>, body: &[u8]) -> StsAction {
        if !matches!(self.state, StsState::Connected | StsState::LoginStart) {
            return self.wrong_state(seq, URI_LOGIN_START);
        }

        let login_name = match sts_body::login_name(body) {
            Ok(name) => name,
            Err(e) => {
                debug!("Malformed LoginStart: {}", e);
                return error(seq, STATUS_BAD_REQUEST);
            }
        };

        let Some(account) = self.accounts.find(&login_name) else {
            info!("Login attempt for unknown account {}", login_name);
            return error(seq, STATUS_UNAUTHORIZED);
        };

        let (server_public_key, challenge) = account.srp_verifier().into_server().server_credentials();
        let body = sts_body::login_start_reply(challenge.salt(), &server_public_key);

        debug!("LoginStart for account {}", account.id.get());
        self.account = Some(account);
        self.challenge = Some(challenge);
        self.state = StsState::LoginStart;
        StsAction::Respond(StsResponse::ok(seq, body))
    }

    fn key_data(&mut self, seq: Option<&str>, body: &[u8]) -> StsAction {
        if self.state != StsState::LoginStart {
            return self.wrong_state(seq, URI_KEY_DATA);
        }
        let Some(challenge) = self.challenge.as_ref() else {
            return self.wrong_state(seq, URI_KEY_DATA);
        };

        let values = match sts_body::key_data(body, 2) {
            Ok(values) => values,
            Err(e) => {
                debug!("Malformed KeyData: {}", e);
                return error(seq, STATUS_BAD_REQUEST);
            }
        };

        let (session, server_proof) = match challenge.key_exchange(&values[0], &values[1]) {
            Ok(result) => result,
            Err(e) => {
                info!("Key exchange failed for {}", challenge.username());
                debug!("Key exchange failure detail: {}", e);
                return error(seq, STATUS_UNAUTHORIZED);
            }
        };

        let key = session.cipher_key();
        info!("Account {} authenticated", session.username());
        self.challenge = None;
        self.cipher_key = Some(key);
        self.state = StsState::Authenticated;

        StsAction::RespondThenEncrypt {
            response: StsResponse::ok(seq, sts_body::key_data_reply(&server_proof)),
            key,
        }
    }

    fn login_finish(&self, seq: Option<&str>) -> StsAction {
        let Some(account) = self.account() else {
            return self.wrong_state(seq, URI_LOGIN_FINISH);
        };

        let body = XmlBody::reply()
            .element("LocationId", LOCATION_ID)
            .element("UserId", account.id.get())
            .element("UserCenter", 0)
            .element("UserName", &account.email)
            .element("AccessMask", account.access_mask)
            .finish();
        StsAction::Respond(StsResponse::ok(seq, body))
    }

    fn request_game_token(&mut self, seq: Option<&str>) -> StsAction {
        let (Some(account), Some(cipher_key)) = (self.account(), self.cipher_key) else {
            return self.wrong_state(seq, URI_REQUEST_GAME_TOKEN);
        };

        let token = self.directory.issue(GameGrant {
            account_id: account.id,
            email: account.email.clone(),
            access_mask: account.access_mask,
            cipher_key,
        });

        let body = XmlBody::reply().element("Token", token.display_form()).finish();
        StsAction::Respond(StsResponse::ok(seq, body))
    }

    fn wrong_state(&self, seq: Option<&str>, uri: &str) -> StsAction {
        warn!("Rejected {} in state {:?}", uri, self.state);
        error(seq, STATUS_BAD_REQUEST)
    }
}

fn error(seq: Option<&str>, status: u16) -> StsAction {
    StsAction::Respond(StsResponse::error(seq, status))
}
