//! # Link Broker
//!
//! Issue, redeem, unlink, sweep. All operations run off the authoritative
//! loop; callers hand user-visible results back to the loop themselves.

use crate::code::{generate_code, generate_token, CODE_LEN};
use crate::error::{LinkError, LinkResult};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tether_store::{now_millis, LinkCodeRow, LinkStore, SourceKind};

/// A freshly issued credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedCode {
    /// The code or token value to show the requester.
    pub code: String,
    /// Expiry, milliseconds since epoch.
    pub expires_at: i64,
}

/// The result of a successful redemption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedeemOutcome {
    /// Which platform the code came from.
    pub source: SourceKind,
    /// The external identity now bound to the redeemer.
    pub external_identity: String,
    /// Display name recorded at issuance.
    pub display_name: String,
}

/// Broker TTL policy, per credential kind.
#[derive(Clone, Copy, Debug)]
pub struct BrokerTtls {
    /// Lifetime of a short code, in seconds.
    pub code_ttl_secs: u64,
    /// Lifetime of a web token, in seconds.
    pub token_ttl_secs: u64,
}

impl Default for BrokerTtls {
    fn default() -> Self {
        Self {
            code_ttl_secs: 900,
            token_ttl_secs: 300,
        }
    }
}

/// Issues and redeems identity-linking credentials.
pub struct LinkBroker {
    store: Arc<LinkStore>,
    ttls: BrokerTtls,
    rng: Mutex<StdRng>,
}

impl LinkBroker {
    /// Creates a broker over the given store.
    #[must_use]
    pub fn new(store: Arc<LinkStore>, ttls: BrokerTtls) -> Self {
        Self {
            store,
            ttls,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Issues a credential binding `source_identity` on `source`.
    ///
    /// Web gets a high-entropy token; every other source gets a short code
    /// from the restricted alphabet. A second issuance for the same
    /// (source, source identity) before expiry supersedes the first.
    pub fn issue(
        &self,
        source: SourceKind,
        source_identity: &str,
        display_name: &str,
    ) -> LinkResult<IssuedCode> {
        self.issue_at(source, source_identity, display_name, now_millis())
    }

    fn issue_at(
        &self,
        source: SourceKind,
        source_identity: &str,
        display_name: &str,
        now_ms: i64,
    ) -> LinkResult<IssuedCode> {
        let (value, ttl_secs) = {
            let mut rng = self.rng.lock();
            match source {
                SourceKind::Web => (generate_token(&mut *rng), self.ttls.token_ttl_secs),
                SourceKind::Chat | SourceKind::Simulation => {
                    (generate_code(&mut *rng), self.ttls.code_ttl_secs)
                }
            }
        };
        let expires_at = now_ms + (ttl_secs as i64) * 1000;

        self.store.upsert_code(&LinkCodeRow {
            code: value.clone(),
            source,
            source_identity: source_identity.to_string(),
            display_name: display_name.to_string(),
            expires_at,
        })?;

        tracing::info!(
            source = source.as_str(),
            source_identity,
            expires_at,
            "link code issued"
        );
        Ok(IssuedCode {
            code: value,
            expires_at,
        })
    }

    /// Redeems a code on behalf of a simulation identity.
    ///
    /// On success the one-to-one invariant holds: no other simulation
    /// identity keeps the claimed external identity, and the redeemer holds
    /// exactly one link for the code's source. Conflicts are resolved
    /// automatically (last redemption wins), never surfaced as failures.
    pub fn redeem(
        &self,
        code: &str,
        simulation_identity: &str,
        simulation_display_name: &str,
    ) -> LinkResult<RedeemOutcome> {
        self.redeem_at(code, simulation_identity, simulation_display_name, now_millis())
    }

    fn redeem_at(
        &self,
        code: &str,
        simulation_identity: &str,
        simulation_display_name: &str,
        now_ms: i64,
    ) -> LinkResult<RedeemOutcome> {
        let normalized = normalize_code(code);
        let Some(row) = self.store.find_code(&normalized)? else {
            return Err(LinkError::CodeNotFound);
        };

        if now_ms > row.expires_at {
            // Lazy expiry: discovered here, removed here.
            self.store.delete_code(&normalized)?;
            tracing::debug!(code = %normalized, "expired code removed at redemption");
            return Err(LinkError::CodeExpired);
        }

        if row.source == SourceKind::Simulation {
            return Err(LinkError::WrongSide);
        }

        self.store.apply_redemption(
            &normalized,
            simulation_identity,
            simulation_display_name,
            row.source,
            &row.source_identity,
            now_ms,
        )?;

        tracing::info!(
            simulation_identity,
            source = row.source.as_str(),
            external_identity = %row.source_identity,
            "account linked"
        );
        Ok(RedeemOutcome {
            source: row.source,
            external_identity: row.source_identity,
            display_name: row.display_name,
        })
    }

    /// Clears one external-identity slot. Returns whether a link existed.
    pub fn unlink(&self, simulation_identity: &str, source: SourceKind) -> LinkResult<bool> {
        let existed = self.store.clear_slot(simulation_identity, source)?;
        if existed {
            tracing::info!(
                simulation_identity,
                source = source.as_str(),
                "account unlinked"
            );
        }
        Ok(existed)
    }

    /// Deletes all expired codes. Returns how many were removed.
    pub fn sweep_expired(&self) -> LinkResult<usize> {
        let removed = self.store.delete_expired_codes(now_millis())?;
        if removed > 0 {
            tracing::debug!(removed, "expired link codes swept");
        }
        Ok(removed)
    }
}

/// Short codes are retyped by humans and stored uppercase; tokens are pasted
/// verbatim and matched exactly.
fn normalize_code(code: &str) -> String {
    if code.len() == CODE_LEN {
        code.to_uppercase()
    } else {
        code.to_string()
    }
}

/// Spawns the periodic expiry sweeper.
///
/// Failures are logged and retried on the next interval, never fatal. The
/// stop flag is polled between short sleeps so disable does not hang for a
/// full interval; an in-flight sweep always completes.
pub fn spawn_sweeper(
    broker: Arc<LinkBroker>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("link-sweeper".to_string())
        .spawn(move || {
            let slice = Duration::from_millis(200);
            'outer: loop {
                let mut waited = Duration::ZERO;
                while waited < interval {
                    if stop.load(Ordering::Relaxed) {
                        break 'outer;
                    }
                    std::thread::sleep(slice);
                    waited += slice;
                }
                if let Err(e) = broker.sweep_expired() {
                    tracing::warn!(error = %e, "expiry sweep failed, will retry next interval");
                }
            }
        })
        .unwrap_or_else(|e| panic!("failed to spawn link sweeper thread: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_store::LinkStore;

    fn broker() -> (Arc<LinkStore>, LinkBroker) {
        let store = Arc::new(LinkStore::open_in_memory().unwrap());
        let b = LinkBroker::new(Arc::clone(&store), BrokerTtls::default());
        (store, b)
    }

    #[test]
    fn only_the_latest_issuance_is_redeemable() {
        let (_store, broker) = broker();

        let first = broker.issue_at(SourceKind::Chat, "c1", "Chatter", 0).unwrap();
        let second = broker.issue_at(SourceKind::Chat, "c1", "Chatter", 1_000).unwrap();

        let err = broker.redeem_at(&first.code, "u1", "PlayerOne", 2_000).unwrap_err();
        assert!(matches!(err, LinkError::CodeNotFound));

        let outcome = broker
            .redeem_at(&second.code, "u1", "PlayerOne", 2_000)
            .unwrap();
        assert_eq!(outcome.source, SourceKind::Chat);
        assert_eq!(outcome.external_identity, "c1");
    }

    #[test]
    fn expired_code_fails_and_is_removed() {
        let (store, broker) = broker();
        let issued = broker.issue_at(SourceKind::Chat, "c1", "Chatter", 0).unwrap();

        let past_expiry = issued.expires_at + 1;
        let err = broker
            .redeem_at(&issued.code, "u1", "PlayerOne", past_expiry)
            .unwrap_err();
        assert!(matches!(err, LinkError::CodeExpired));

        // The lazy-expiry side effect deleted the row; a retry is NotFound.
        assert!(store.find_code(&issued.code).unwrap().is_none());
        let err = broker
            .redeem_at(&issued.code, "u1", "PlayerOne", past_expiry)
            .unwrap_err();
        assert!(matches!(err, LinkError::CodeNotFound));
    }

    #[test]
    fn web_code_scenario() {
        // Issue at t0 with TTL 900s, redeem at t0+800s, then redeem again.
        let (store, broker) = broker();
        let t0 = 1_700_000_000_000;

        store
            .upsert_code(&LinkCodeRow {
                code: "AB12CD".to_string(),
                source: SourceKind::Web,
                source_identity: "w1".to_string(),
                display_name: "Webber".to_string(),
                expires_at: t0 + 900_000,
            })
            .unwrap();

        let outcome = broker
            .redeem_at("AB12CD", "u1", "PlayerOne", t0 + 800_000)
            .unwrap();
        assert_eq!(outcome.external_identity, "w1");
        let u1 = store.account("u1").unwrap().unwrap();
        assert_eq!(u1.web_identity.as_deref(), Some("w1"));

        // Already consumed: indistinguishable from never-issued.
        let err = broker
            .redeem_at("AB12CD", "u1", "PlayerOne", t0 + 801_000)
            .unwrap_err();
        assert!(matches!(err, LinkError::CodeNotFound));
    }

    #[test]
    fn chat_identity_moves_to_the_latest_redeemer() {
        let (store, broker) = broker();

        let a = broker.issue_at(SourceKind::Chat, "c1", "Chatter", 0).unwrap();
        broker.redeem_at(&a.code, "u1", "PlayerOne", 1_000).unwrap();

        let b = broker.issue_at(SourceKind::Chat, "c1", "Chatter", 2_000).unwrap();
        broker.redeem_at(&b.code, "u2", "PlayerTwo", 3_000).unwrap();

        assert!(store.account("u1").unwrap().is_none());
        let u2 = store.account("u2").unwrap().unwrap();
        assert_eq!(u2.chat_identity.as_deref(), Some("c1"));
    }

    #[test]
    fn short_codes_are_case_insensitive() {
        let (_store, broker) = broker();
        let issued = broker.issue_at(SourceKind::Chat, "c1", "Chatter", 0).unwrap();
        let outcome = broker
            .redeem_at(&issued.code.to_lowercase(), "u1", "PlayerOne", 1_000)
            .unwrap();
        assert_eq!(outcome.external_identity, "c1");
    }

    #[test]
    fn simulation_codes_cannot_be_redeemed_here() {
        let (_store, broker) = broker();
        let issued = broker
            .issue_at(SourceKind::Simulation, "u9", "PlayerNine", 0)
            .unwrap();
        let err = broker
            .redeem_at(&issued.code, "u1", "PlayerOne", 1_000)
            .unwrap_err();
        assert!(matches!(err, LinkError::WrongSide));
    }

    #[test]
    fn web_issuance_is_a_long_token() {
        let (_store, broker) = broker();
        let issued = broker.issue_at(SourceKind::Web, "w1", "Webber", 0).unwrap();
        assert_eq!(issued.code.len(), crate::code::TOKEN_LEN);
        assert_eq!(issued.expires_at, 300_000);
    }

    #[test]
    fn unlink_reports_whether_a_link_existed() {
        let (_store, broker) = broker();
        assert!(!broker.unlink("u1", SourceKind::Web).unwrap());

        let issued = broker.issue_at(SourceKind::Web, "w1", "Webber", 0).unwrap();
        broker.redeem_at(&issued.code, "u1", "PlayerOne", 1_000).unwrap();
        assert!(broker.unlink("u1", SourceKind::Web).unwrap());
        assert!(!broker.unlink("u1", SourceKind::Web).unwrap());
    }
}
