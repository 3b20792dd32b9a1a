//! OSNMA receiver engine.
//!
//! The [`Engine`] drives the whole receiver: it decodes pages, assembles
//! sub-frames, reassembles and verifies DSM messages, maintains the TESLA
//! key chain, resolves tags against the stored navigation data, and
//! reports everything through the event bus. All state is owned by the
//! engine and mutated from a single thread; sub-frames are processed in
//! GST order per satellite, and within a sub-frame tags resolve in
//! ascending position.

use crate::bitfields::{
    dsm_type_for_id, Adkd, ChainAndPubkeyStatus, DsmHeader, DsmKroot, DsmPkr, DsmType, Mack,
    NewPublicKeyType, NmaHeader, NmaStatus,
};
use crate::dsm::CollectDsm;
use crate::events::{AuthOutcome, Event, Subscriber};
use crate::mack::{ExpiredMack, MackStorage};
use crate::merkle_tree::MerkleTree;
use crate::navmessage::{NavMessageData, NavMessageStore};
use crate::pages::{PageDecoder, PageError};
use crate::storage::StaticStorage;
use crate::subframe::{Subframe, SubframeAssembler};
use crate::tesla::{Chain, Key};
use crate::types::{HalfPage, InavBand, MackMessage, MerkleTreeNode, PageBits};
use crate::validation::{NotValidated, Validated};
use crate::{Gst, PublicKey, Svn};
use core::cmp::Ordering;

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Pinned Merkle tree root, enabling DSM-PKR validation.
    pub merkle_root: Option<MerkleTreeNode>,
    /// ECDSA public key to verify DSM-KROOT signatures.
    ///
    /// May be omitted when a Merkle tree root is given; the engine will
    /// then wait for a public key from a DSM-PKR message.
    pub pubkey: Option<PublicKey<Validated>>,
    /// Emit sub-frames with missing pages instead of dropping them.
    pub allow_gaps: bool,
}

/// OSNMA receiver engine.
///
/// Pages are fed with [`Engine::feed_page`] or
/// [`Engine::feed_half_page`]; events are delivered to the subscribers
/// registered with [`Engine::subscribe`].
pub struct Engine<S: StaticStorage> {
    pages: PageDecoder,
    assembler: SubframeAssembler,
    dsm: CollectDsm,
    navmessage: NavMessageStore<S>,
    mack: MackStorage<S>,
    merkle_tree: Option<MerkleTree>,
    pubkey: PubkeyStore,
    key: KeyStore,
    subscribers: Vec<Box<dyn Subscriber>>,
    events: Vec<Event>,
    kroot_cache: Option<Vec<u8>>,
}

impl<S: StaticStorage> Engine<S> {
    /// Creates a new engine from its configuration.
    pub fn new(config: EngineConfig) -> Engine<S> {
        Engine {
            pages: PageDecoder::new(),
            assembler: SubframeAssembler::new(config.allow_gaps),
            dsm: CollectDsm::new(),
            navmessage: NavMessageStore::new(),
            mack: MackStorage::new(),
            merkle_tree: config.merkle_root.map(MerkleTree::new),
            pubkey: config
                .pubkey
                .map_or_else(PubkeyStore::empty, PubkeyStore::from_current),
            key: KeyStore::empty(),
            subscribers: Vec::new(),
            events: Vec::new(),
            kroot_cache: None,
        }
    }

    /// Registers a subscriber. Subscribers receive every event in
    /// emission order.
    pub fn subscribe(&mut self, subscriber: Box<dyn Subscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Feed a full 240-bit nominal page.
    ///
    /// The `gst` parameter gives the GST at the start of the page
    /// transmission, and `band` the signal band of the page.
    pub fn feed_page(&mut self, svn: Svn, gst: Gst, page: &PageBits, band: InavBand) {
        let decoded = self.pages.feed_page(svn, gst, page);
        self.handle_decoded(decoded, svn, gst, band);
        self.dispatch();
    }

    /// Feed a 120-bit half-page. See [`PageDecoder`](crate::pages::PageDecoder)
    /// for the pairing rules.
    pub fn feed_half_page(&mut self, svn: Svn, gst: Gst, half: &HalfPage, band: InavBand) {
        let decoded = self.pages.feed_half_page(svn, gst, half);
        self.handle_decoded(decoded, svn, gst, band);
        self.dispatch();
    }

    fn handle_decoded(
        &mut self,
        decoded: Result<Option<crate::pages::Page>, PageError>,
        svn: Svn,
        gst: Gst,
        band: InavBand,
    ) {
        match decoded {
            Err(PageError::Crc) => self.events.push(Event::PageCrcFail { svn, gst }),
            Err(PageError::Pairing) => self.events.push(Event::PagePairingFail { svn, gst }),
            Ok(None) => (),
            Ok(Some(page)) => {
                self.navmessage.feed(&page.word, svn, page.gst, band);
                // The OSNMA field is only broadcast on E1B
                if band == InavBand::E1B {
                    let (subframe, gap) = self.assembler.feed(&page);
                    if let Some(gap) = gap {
                        self.events.push(Event::SubframeGap {
                            svn: gap.svn,
                            gst: gap.gst,
                            pages: gap.present,
                        });
                    }
                    if let Some(subframe) = subframe {
                        self.process_subframe(subframe);
                    }
                }
            }
        }
    }

    /// Offer a cached KROOT artifact for a hot start.
    ///
    /// The artifact holds the NMA header byte followed by the DSM-KROOT
    /// bytes, as produced by [`Engine::kroot_cache`]. It is processed as
    /// if the DSM-KROOT had just been reassembled; on signature failure
    /// it is discarded and the engine waits for the live broadcast.
    /// Returns `true` if a chain was installed.
    pub fn hot_start(&mut self, artifact: &[u8]) -> bool {
        let installed = self.try_hot_start(artifact);
        self.dispatch();
        installed
    }

    fn try_hot_start(&mut self, artifact: &[u8]) -> bool {
        if artifact.len() < 14 {
            log::error!("cached KROOT artifact is too short");
            return false;
        }
        let nma_header = NmaHeader::new(artifact[0]);
        let dsm_kroot = DsmKroot(&artifact[1..]);
        let Some(key_size) = dsm_kroot.key_size() else {
            log::error!("cached KROOT artifact has a reserved key size");
            return false;
        };
        // Reject artifacts whose length fits neither ECDSA function, so
        // the field accessors cannot panic below.
        let kroot_len = key_size / 8;
        let remaining = artifact.len() as i64 - 1 - 13 - kroot_len as i64;
        let block = 13;
        let fits = |sig: i64| {
            let padding = (block - (kroot_len as i64 + sig) % block) % block;
            remaining == sig + padding
        };
        if remaining < 0 || (!fits(64) && !fits(132)) {
            log::error!("cached KROOT artifact has an inconsistent length");
            return false;
        }
        let tow = u32::from(dsm_kroot.kroot_towh()) * 3600;
        if tow >= 7 * 24 * 3600 {
            log::error!("cached KROOT artifact has an invalid time of week");
            return false;
        }
        let gst = Gst::new(dsm_kroot.kroot_wn(), tow);
        log::info!("attempting hot start from cached KROOT");
        self.process_dsm_kroot(dsm_kroot, nma_header, gst)
    }

    /// Returns the artifact bytes of the last verified DSM-KROOT, for
    /// persisting across runs.
    pub fn kroot_cache(&self) -> Option<&[u8]> {
        self.kroot_cache.as_deref()
    }

    /// Try to get authenticated CED and health status data (ADKD=0 and
    /// 12) for a satellite.
    pub fn get_ced_and_status(&self, svn: Svn) -> Option<NavMessageData> {
        self.navmessage.get_ced_and_status(svn)
    }

    /// Try to get authenticated timing parameters data (ADKD=4) for a
    /// satellite.
    pub fn get_timing_parameters(&self, svn: Svn) -> Option<NavMessageData> {
        self.navmessage.get_timing_parameters(svn)
    }

    fn process_subframe(&mut self, subframe: Subframe) {
        let svn = subframe.svn();
        let gst = subframe.gst();
        // Report expired pending tags first, so every tag reaches exactly
        // one terminal outcome.
        self.expire_pending(gst);
        if !subframe.complete() {
            // NAV words were already stored per page; without all pages
            // the HKROOT and MACK streams cannot be used.
            log::debug!(
                "{} sub-frame {:?} has missing pages ({:#06x}); OSNMA streams skipped",
                svn,
                gst,
                subframe.present()
            );
            return;
        }
        let hkroot = subframe.hkroot();
        let nma_header = NmaHeader::new(hkroot[0]);
        self.mack.store(subframe.mack(), svn, gst);
        let dsm_header = DsmHeader(hkroot[1..2].try_into().unwrap());
        let dsm_block = hkroot[2..].try_into().unwrap();
        // Copy a completed DSM out of the collector so its buffer borrow
        // does not outlive this statement.
        let completed = self
            .dsm
            .feed(dsm_header, &dsm_block, gst)
            .map(|dsm| (dsm.id(), dsm.data().to_vec()));
        if let Some((id, data)) = completed {
            self.process_dsm(id, &data, nma_header, gst);
        }
        self.validate_key(subframe.mack(), svn, gst);
    }

    fn expire_pending(&mut self, gst: Gst) {
        let chain = self.key.current_key().map(|k| *k.chain());
        let expired = self.mack.sweep_expired(gst);
        if expired.is_empty() {
            return;
        }
        let Some(chain) = chain else {
            // Without chain parameters the stored MACK messages cannot be
            // split into tags.
            log::debug!(
                "{} expired MACK messages discarded without chain parameters",
                expired.len()
            );
            return;
        };
        for entry in &expired {
            self.emit_missing_key(entry, &chain);
        }
    }

    fn emit_missing_key(&mut self, entry: &ExpiredMack, chain: &Chain) {
        let mack = Mack::new(&entry.message, chain.key_size_bits(), chain.tag_size_bits());
        if entry.fast_pending {
            // tag0 authenticates the transmitter's own data
            self.events.push(Event::AuthAttempt {
                prnd: u8::from(entry.svn),
                prna: entry.svn,
                gst: entry.gst,
                adkd: Adkd::InavCed,
                outcome: AuthOutcome::MissingKey,
            });
        }
        for j in 1..mack.num_tags() {
            let tag = mack.tag_and_info(j);
            let Ok(prnd) = u8::try_from(tag.prnd()) else {
                continue;
            };
            let adkd = tag.adkd();
            let pending = match adkd {
                Adkd::SlowMac => entry.slow_pending,
                Adkd::Reserved => false,
                _ => entry.fast_pending,
            };
            if pending {
                self.events.push(Event::AuthAttempt {
                    prnd,
                    prna: entry.svn,
                    gst: entry.gst,
                    adkd,
                    outcome: AuthOutcome::MissingKey,
                });
            }
        }
    }

    fn process_dsm(&mut self, id: u8, data: &[u8], nma_header: NmaHeader<NotValidated>, gst: Gst) {
        match dsm_type_for_id(id) {
            DsmType::Kroot => {
                self.process_dsm_kroot(DsmKroot(data), nma_header, gst);
            }
            DsmType::Pkr => self.process_dsm_pkr(DsmPkr(data)),
        }
    }

    fn process_dsm_kroot(
        &mut self,
        dsm_kroot: DsmKroot,
        nma_header: NmaHeader<NotValidated>,
        gst: Gst,
    ) -> bool {
        let pkid = dsm_kroot.public_key_id();
        let Some(pubkey) = self.pubkey.applicable_pubkey(pkid) else {
            return false;
        };
        match Key::from_dsm_kroot(nma_header, dsm_kroot, pubkey) {
            Ok((key, nma_header)) => {
                log::info!("verified KROOT with public key id {}", pkid);
                self.pubkey.make_pkid_current(pkid);
                self.key.store_kroot(key, nma_header, gst);
                self.events.push(Event::KrootVerified {
                    chain_id: nma_header.chain_id(),
                    gst,
                });
                let mut cache = Vec::with_capacity(1 + dsm_kroot.0.len());
                cache.push(nma_header.data());
                cache.extend_from_slice(dsm_kroot.0);
                self.kroot_cache = Some(cache);
                self.process_nma_header(nma_header, pkid);
                true
            }
            Err(e) => {
                log::error!("could not verify KROOT: {}", e);
                self.events.push(Event::KrootSignatureFail { gst });
                false
            }
        }
    }

    fn process_nma_header(&mut self, nma_header: NmaHeader<Validated>, pkid: u8) {
        match nma_header.nma_status() {
            NmaStatus::Operational => (),
            NmaStatus::Test => log::info!("NMA status is test"),
            NmaStatus::Reserved => {
                log::error!("NMA status has a reserved value; assuming don't use")
            }
            NmaStatus::DontUse => {
                log::warn!("NMA status is don't use");
                match nma_header.chain_and_pubkey_status() {
                    ChainAndPubkeyStatus::ChainRevoked => {
                        self.key.revoke(nma_header.chain_id());
                    }
                    ChainAndPubkeyStatus::PublicKeyRevoked => {
                        // The KROOT that flagged the revocation is already
                        // signed with the new key, so earlier keys are the
                        // ones to revoke. A key revocation also changes
                        // the chain.
                        self.pubkey.revoke(pkid);
                        self.key.revoke(nma_header.chain_id());
                    }
                    _ => (),
                }
            }
        }
        match nma_header.chain_and_pubkey_status() {
            ChainAndPubkeyStatus::Reserved => log::error!("CPKS has a reserved value"),
            ChainAndPubkeyStatus::Nominal => (),
            ChainAndPubkeyStatus::EndOfChain => log::info!("CPKS is end of chain"),
            ChainAndPubkeyStatus::ChainRevoked => log::warn!("CPKS is chain revoked"),
            ChainAndPubkeyStatus::NewPublicKey => log::info!("CPKS is new public key"),
            ChainAndPubkeyStatus::PublicKeyRevoked => log::warn!("CPKS is public key revoked"),
            ChainAndPubkeyStatus::NewMerkleTree => log::warn!("CPKS is new Merkle tree"),
            ChainAndPubkeyStatus::AlertMessage => log::warn!("CPKS is alert message"),
        }
    }

    fn process_dsm_pkr(&mut self, dsm_pkr: DsmPkr) {
        let Some(merkle_tree) = &self.merkle_tree else {
            log::error!("cannot process DSM-PKR because no Merkle tree is loaded");
            return;
        };
        match dsm_pkr.new_public_key_type() {
            NewPublicKeyType::EcdsaKey(_) => match merkle_tree.validate_pkr(dsm_pkr) {
                Ok(pubkey) => {
                    log::info!("verified public key in DSM-PKR: {:?}", dsm_pkr);
                    self.pubkey.store_new_pubkey(pubkey);
                }
                Err(e) => log::error!("could not verify public key: {}", e),
            },
            NewPublicKeyType::OsnmaAlertMessage => {
                match merkle_tree.validate_alert_message(dsm_pkr) {
                    Ok(()) => {
                        log::warn!("received valid OSNMA alert message; deleting cryptographic material");
                        self.merkle_tree = None;
                        self.pubkey = PubkeyStore::empty();
                        self.key = KeyStore::empty();
                        self.kroot_cache = None;
                    }
                    Err(e) => log::error!("could not verify alert message: {}", e),
                }
            }
            NewPublicKeyType::Reserved => {
                log::error!("reserved NPKT in DSM-PKR: {:?}", dsm_pkr);
            }
        }
    }

    fn validate_key(&mut self, mack: &MackMessage, svn: Svn, gst: Gst) {
        let Some(current_key) = self.key.current_key() else {
            log::info!("no valid TESLA key for the chain in force; cannot validate disclosed key");
            return;
        };
        let current_key = *current_key;
        let mack = Mack::new(
            mack,
            current_key.chain().key_size_bits(),
            current_key.chain().tag_size_bits(),
        );
        let new_key = Key::from_bitslice(mack.key(), gst, current_key.chain());
        match current_key.gst_subframe().cmp(&new_key.gst_subframe()) {
            Ordering::Equal => {
                // replayed disclosure of the key we already have
            }
            Ordering::Greater => {
                log::warn!(
                    "disclosed key at {:?} is older than the current valid key at {:?}",
                    new_key.gst_subframe(),
                    current_key.gst_subframe()
                );
            }
            Ordering::Less => match current_key.validate_key(&new_key) {
                Ok(new_valid_key) => {
                    log::info!(
                        "new TESLA key at {:?} validated by the key at {:?}",
                        new_valid_key.gst_subframe(),
                        current_key.gst_subframe()
                    );
                    self.key.store_key(new_valid_key);
                    self.process_tags(&new_valid_key);
                }
                Err(e) => {
                    log::error!("could not validate disclosed TESLA key: {}", e);
                    self.events.push(Event::KeyChainFail { svn, gst });
                }
            },
        }
    }

    fn process_tags(&mut self, current_key: &Key<Validated>) {
        let gst_mack = current_key.gst_subframe().add_seconds(-30);
        let gst_slowmac = gst_mack.add_seconds(-300);
        // Key for the MACK header checks of the Slow MAC sub-frame. It
        // may belong to a previous chain after a renewal.
        let gst_k_slowmac = current_key.gst_subframe().add_seconds(-300);
        let slowmac_key = self.key.key_past_chain(gst_k_slowmac).and_then(|k| {
            let derivations = k.gst_subframe().subframes_difference(gst_k_slowmac);
            if derivations >= 0 {
                Some(k.derive(derivations.try_into().unwrap()))
            } else {
                None
            }
        });
        for svn in Svn::iter() {
            if let Some(mack_message) = self.mack.get(svn, gst_mack).copied() {
                let mack = Mack::new(
                    &mack_message,
                    current_key.chain().key_size_bits(),
                    current_key.chain().tag_size_bits(),
                );
                match mack.validate(current_key, svn, gst_mack) {
                    Ok(mack) => {
                        self.navmessage.process_mack(
                            mack,
                            current_key,
                            svn,
                            gst_mack,
                            &mut self.events,
                        );
                    }
                    Err(e) => {
                        log::error!("error validating {} {:?} MACK: {}", svn, gst_mack, e);
                    }
                }
                // Either way the fast tags have reached their terminal
                // state for this MACK.
                self.mack.mark_fast_resolved(svn, gst_mack);
            }

            if let Some(slowmac_key) = &slowmac_key {
                if let Some(mack_message) = self.mack.get(svn, gst_slowmac).copied() {
                    let mack = Mack::new(
                        &mack_message,
                        current_key.chain().key_size_bits(),
                        current_key.chain().tag_size_bits(),
                    );
                    // The MACK header is validated with the contemporary
                    // key; the Slow MAC tags with the current key.
                    match mack.validate(slowmac_key, svn, gst_slowmac) {
                        Ok(mack) => {
                            self.navmessage.process_mack_slowmac(
                                mack,
                                current_key,
                                svn,
                                gst_slowmac,
                                &mut self.events,
                            );
                        }
                        Err(e) => {
                            log::error!(
                                "error validating {} {:?} Slow MAC MACK: {}",
                                svn,
                                gst_slowmac,
                                e
                            );
                        }
                    }
                    self.mack.mark_slow_resolved(svn, gst_slowmac);
                }
            }
        }
    }

    fn dispatch(&mut self) {
        for event in self.events.drain(..) {
            for subscriber in self.subscribers.iter_mut() {
                if let Err(e) = subscriber.handle(&event) {
                    log::error!("subscriber failed to handle event {}: {}", event, e);
                }
            }
        }
    }
}

#[cfg(test)]
impl<S: StaticStorage> Engine<S> {
    pub(crate) fn test_install_key(&mut self, key: Key<Validated>, nma_header: NmaHeader<Validated>) {
        let gst = key.gst_subframe();
        self.key.store_kroot(key, nma_header, gst);
    }
}

#[derive(Debug, Clone)]
struct PubkeyStore {
    current: Option<PublicKey<Validated>>,
    next: Option<PublicKey<Validated>>,
}

impl PubkeyStore {
    fn empty() -> PubkeyStore {
        PubkeyStore {
            current: None,
            next: None,
        }
    }

    fn from_current(current: PublicKey<Validated>) -> PubkeyStore {
        PubkeyStore {
            current: Some(current),
            next: None,
        }
    }

    fn check_consistency(&self) {
        // if next is Some, current must also be Some
        assert!(self.next.is_none() || self.current.is_some());
    }

    fn applicable_pubkey(&self, pkid: u8) -> Option<&PublicKey<Validated>> {
        self.check_consistency();
        match (&self.current, &self.next) {
            (Some(k), _) if k.public_key_id() == pkid => Some(k),
            (_, Some(k)) if k.public_key_id() == pkid => {
                log::info!("selecting next public key to authenticate KROOT");
                Some(k)
            }
            (Some(_), _) => {
                log::error!(
                    "could not verify KROOT because public key with id {} is not available",
                    pkid
                );
                None
            }
            (None, _) => {
                log::error!("could not verify KROOT because no public key is available");
                None
            }
        }
    }

    fn make_pkid_current(&mut self, pkid: u8) {
        self.check_consistency();
        if self.current.as_ref().map(|k| k.public_key_id()) == Some(pkid) {
            return;
        }
        if self.next.as_ref().map(|k| k.public_key_id()) == Some(pkid) {
            // the PKID of current must be smaller (current cannot be None)
            assert!(self.current.as_ref().unwrap().public_key_id() < pkid);
            self.current = self.next.take();
            return;
        }
        // unreachable, because the KROOT was authenticated with one of
        // the stored keys
        panic!("inconsistent public key store state");
    }

    fn store_new_pubkey(&mut self, pubkey: PublicKey<Validated>) {
        self.check_consistency();
        let new_pkid = pubkey.public_key_id();
        let Some(current) = &self.current else {
            self.current = Some(pubkey);
            return;
        };
        let curr_pkid = current.public_key_id();
        if new_pkid < curr_pkid {
            log::error!(
                "received public key with id {} smaller than current id {}; discarding",
                new_pkid,
                curr_pkid
            );
            return;
        }
        if new_pkid == curr_pkid {
            return;
        }
        match &self.next {
            None => self.next = Some(pubkey),
            Some(next) => match new_pkid.cmp(&next.public_key_id()) {
                Ordering::Less => log::error!(
                    "received public key with id {} smaller than the next id {}; discarding",
                    new_pkid,
                    next.public_key_id()
                ),
                Ordering::Greater => {
                    log::warn!(
                        "received public key with id {} greater than the next id {}; overwriting",
                        new_pkid,
                        next.public_key_id()
                    );
                    self.next = Some(pubkey);
                }
                Ordering::Equal => (),
            },
        }
    }

    fn revoke(&mut self, new_pkid: u8) {
        let revoked = |k: &PublicKey<Validated>| k.public_key_id() < new_pkid;
        if self.current.as_ref().is_some_and(revoked) {
            log::warn!("revoking current public key (earlier than pkid {})", new_pkid);
            self.current = None;
        }
        if self.next.as_ref().is_some_and(revoked) {
            log::warn!("revoking next public key (earlier than pkid {})", new_pkid);
            self.next = None;
        }
        // keep the store consistent if only the current key was revoked
        if self.current.is_none() {
            self.current = self.next.take();
        }
    }
}

// Holds the TESLA key for the chain in force plus a KROOT for a chain
// that will come into force, so Slow MAC tags spanning a renewal can
// still be checked.
#[derive(Debug, Clone)]
struct KeyStore {
    keys: [Option<Key<Validated>>; 2],
    chain_in_force: Option<ChainInForce>,
}

#[derive(Debug, Clone)]
struct ChainInForce {
    cid: u8,
    // None while the chain has never replaced a different one; otherwise
    // the GST at which the replacement happened.
    start_applicability: Option<Gst>,
}

impl KeyStore {
    fn empty() -> KeyStore {
        KeyStore {
            keys: [None; 2],
            chain_in_force: None,
        }
    }

    fn store_kroot(&mut self, key: Key<Validated>, nma_header: NmaHeader<Validated>, gst: Gst) {
        let kid = key.chain().chain_id();
        let cid = nma_header.chain_id();
        match (&self.keys[0], &self.keys[1]) {
            (Some(k), _) if k.chain().chain_id() == kid => {
                // a key for the same chain is already held
            }
            (_, Some(k)) if k.chain().chain_id() == kid => {}
            (None, _) => {
                log::info!("storing KROOT for chain {} in slot 0", kid);
                self.keys[0] = Some(key);
            }
            (_, None) => {
                log::info!("storing KROOT for chain {} in slot 1", kid);
                self.keys[1] = Some(key);
            }
            (Some(k0), Some(_)) => {
                // both slots occupied; do not overwrite the slot of the
                // chain in force
                if k0.chain().chain_id() == cid {
                    log::info!("overwriting slot 1 with KROOT for chain {}", kid);
                    self.keys[1] = Some(key);
                } else {
                    log::info!("overwriting slot 0 with KROOT for chain {}", kid);
                    self.keys[0] = Some(key);
                }
            }
        }
        self.chain_in_force = Some(ChainInForce {
            cid,
            start_applicability: self
                .chain_in_force
                .as_ref()
                .and_then(|cif| if cif.cid != cid { Some(gst) } else { None }),
        });
    }

    fn store_key(&mut self, key: Key<Validated>) {
        let id = key.chain().chain_id();
        match (&self.keys[0], &self.keys[1]) {
            (Some(k), _) if k.chain().chain_id() == id => self.keys[0] = Some(key),
            (_, Some(k)) if k.chain().chain_id() == id => self.keys[1] = Some(key),
            _ => {
                // the key was validated against one of the stored keys,
                // so it must belong to one of the stored chains
                unreachable!();
            }
        }
    }

    fn current_key(&self) -> Option<&Key<Validated>> {
        self.chain_in_force.as_ref().and_then(|cif| {
            self.keys
                .iter()
                .flatten()
                .find(|&&k| k.chain().chain_id() == cif.cid)
        })
    }

    // Like current_key, but returns the key of the previous chain when
    // the requested GST is before the start of applicability of the
    // chain in force.
    fn key_past_chain(&self, gst: Gst) -> Option<&Key<Validated>> {
        self.chain_in_force
            .as_ref()
            .and_then(|cif| match cif.start_applicability {
                Some(gst0) if gst0 > gst => self
                    .keys
                    .iter()
                    .flatten()
                    .find(|&&k| k.chain().chain_id() != cif.cid),
                _ => self.current_key(),
            })
    }

    fn revoke(&mut self, cid: u8) {
        for k in &mut self.keys {
            if let Some(key) = k {
                if key.chain().chain_id() == cid {
                    log::warn!("revoking TESLA key of chain {}", cid);
                    *k = None;
                }
            }
        }
    }
}
