//! Checkout session engine.
//!
//! Holds one visitor's checkout inputs and re-derives the price breakdown
//! from them on every read. Two inputs resolve asynchronously against the
//! backend:
//!
//! - the loyalty discount, looked up once the email/phone fields have been
//!   quiet for the debounce window; only the response to the newest edit is
//!   applied
//! - the shipping suggestion for a postal code, applied only if the visitor
//!   has not picked an option by hand since the request was issued
//!
//! [`CheckoutSessions`] keeps one session per visitor so both survive
//! between requests.

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use spoke_core::{
    CartLine, ContactError, Email, LoyaltyDiscount, PaymentMethod, Phone, PostalCode,
    PriceBreakdown, ShippingOptionId, compute_breakdown, compute_subtotal,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::backend::{
    BackendError, CheckoutApi, OrderConfirmation, OrderCustomer, OrderItem, OrderRequest,
    ShippingQuote,
};
use crate::config::CheckoutConfig;

/// Errors that can occur during checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Input rejected before anything was sent.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A shipping estimate is still being calculated.
    #[error("A shipping estimate is already being calculated")]
    Busy,

    /// The backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl From<ContactError> for CheckoutError {
    fn from(err: ContactError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Where the loyalty lookup stands.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", content = "discount", rename_all = "snake_case")]
pub enum LoyaltyStatus {
    /// No contact details to look up yet.
    #[default]
    Unresolved,
    /// The backend knows no discount for these details.
    NotEligible,
    /// The backend granted a discount.
    Resolved(LoyaltyDiscount),
}

impl LoyaltyStatus {
    /// The discount to price with, if any.
    #[must_use]
    pub const fn discount(&self) -> Option<&LoyaltyDiscount> {
        match self {
            Self::Resolved(discount) => Some(discount),
            Self::Unresolved | Self::NotEligible => None,
        }
    }
}

/// What a non-blocking notice is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    LoyaltyLookupFailed,
    ShippingEstimateFailed,
}

/// Message to show the visitor without interrupting checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    fn loyalty_lookup_failed() -> Self {
        Self {
            kind: NoticeKind::LoyaltyLookupFailed,
            message: "We couldn't check your loyalty discount right now.".to_string(),
        }
    }

    fn shipping_estimate_failed() -> Self {
        Self {
            kind: NoticeKind::ShippingEstimateFailed,
            message: "We couldn't estimate shipping for that postal code.".to_string(),
        }
    }
}

/// Result of a postal-code shipping estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingSuggestion {
    pub quote: ShippingQuote,
    /// The option that was selected because of this quote, if any.
    pub applied: Option<ShippingOptionId>,
}

/// Customer block as typed into the checkout form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// Contact details a resolved discount belongs to.
type ContactKey = (Option<Email>, Option<Phone>);

/// Snapshot of a checkout as the page renders it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView {
    pub breakdown: PriceBreakdown,
    pub loyalty: LoyaltyStatus,
    pub loyalty_loading: bool,
    pub shipping_option: ShippingOptionId,
    pub calculating_shipping: bool,
    pub payment_method: PaymentMethod,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Default)]
struct CheckoutState {
    cart: Vec<CartLine>,
    payment: PaymentMethod,
    shipping: ShippingOptionId,
    /// Bumped on every manual shipping selection.
    shipping_version: u64,
    calculating: bool,
    loyalty: LoyaltyStatus,
    /// Contact the current `loyalty` was looked up for.
    loyalty_for: Option<ContactKey>,
    loyalty_loading: bool,
    notices: Vec<Notice>,
}

/// One visitor's checkout.
///
/// The debounced lookup runs on the Tokio runtime, so
/// [`update_contact`](Self::update_contact) must be called from within one.
pub struct CheckoutSession<B> {
    backend: Arc<B>,
    debounce: Duration,
    state: Arc<RwLock<CheckoutState>>,
    /// Sequence number of the newest contact edit.
    lookup_seq: watch::Sender<u64>,
    lookup_task: Mutex<Option<JoinHandle<()>>>,
}

impl<B: CheckoutApi> CheckoutSession<B> {
    /// Create an empty checkout.
    #[must_use]
    pub fn new(backend: Arc<B>, config: &CheckoutConfig) -> Self {
        let (lookup_seq, _) = watch::channel(0);
        Self {
            backend,
            debounce: config.loyalty_debounce,
            state: Arc::new(RwLock::new(CheckoutState::default())),
            lookup_seq,
            lookup_task: Mutex::new(None),
        }
    }

    /// Replace the cart contents.
    pub fn set_cart(&self, cart: Vec<CartLine>) {
        write_state(&self.state).cart = cart;
    }

    pub fn set_payment_method(&self, payment: PaymentMethod) {
        write_state(&self.state).payment = payment;
    }

    #[must_use]
    pub fn shipping_option(&self) -> ShippingOptionId {
        read_state(&self.state).shipping
    }

    /// Pick a shipping option by hand.
    ///
    /// Always permitted, even while an estimate is in flight; that estimate's
    /// suggestion is then discarded when it arrives.
    pub fn select_shipping_option(&self, id: ShippingOptionId) {
        let mut state = write_state(&self.state);
        state.shipping = id;
        state.shipping_version = state.shipping_version.wrapping_add(1);
    }

    #[must_use]
    pub fn loyalty(&self) -> LoyaltyStatus {
        read_state(&self.state).loyalty.clone()
    }

    /// Whether a loyalty lookup is on the wire.
    #[must_use]
    pub fn is_loyalty_loading(&self) -> bool {
        read_state(&self.state).loyalty_loading
    }

    /// Whether a shipping estimate is on the wire.
    #[must_use]
    pub fn is_calculating_shipping(&self) -> bool {
        read_state(&self.state).calculating
    }

    /// Drain the notices recorded since the last call.
    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut write_state(&self.state).notices)
    }

    /// Price breakdown for the current inputs.
    #[must_use]
    pub fn breakdown(&self) -> PriceBreakdown {
        price(&read_state(&self.state))
    }

    /// Everything the page shows, draining pending notices.
    pub fn view(&self) -> CheckoutView {
        let mut state = write_state(&self.state);
        CheckoutView {
            breakdown: price(&state),
            loyalty: state.loyalty.clone(),
            loyalty_loading: state.loyalty_loading,
            shipping_option: state.shipping,
            calculating_shipping: state.calculating,
            payment_method: state.payment,
            notices: std::mem::take(&mut state.notices),
        }
    }

    /// React to an edit of the email or phone field.
    ///
    /// The lookup is sent once no further edit has arrived for the debounce
    /// window. An edit supersedes any lookup still waiting to be sent, and a
    /// response to a superseded edit is ignored. With both fields blank the
    /// discount goes back to unresolved and nothing is sent.
    pub fn update_contact(&self, email: &str, phone: &str) {
        let seq = self.next_lookup_seq();
        let email = parse_optional(email, Email::parse);
        let phone = parse_optional(phone, Phone::parse);

        if email.is_none() && phone.is_none() {
            reset_loyalty(&self.state);
            return;
        }

        let mut current = self.lookup_seq.subscribe();
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let debounce = self.debounce;

        let handle = tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(debounce) => {}
                _ = current.changed() => {
                    debug!(seq, "Loyalty lookup superseded before sending");
                    return;
                }
            }
            // Failures are recorded as a notice inside the lookup
            let _ = run_lookup(
                &*backend,
                &state,
                &current,
                seq,
                email.as_ref(),
                phone.as_ref(),
            )
            .await;
        });

        *self
            .lookup_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Look the discount up immediately, superseding any pending lookup.
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails; the previously resolved
    /// discount is kept in that case.
    #[instrument(skip_all)]
    pub async fn resolve_loyalty_now(
        &self,
        email: &str,
        phone: &str,
    ) -> Result<LoyaltyStatus, CheckoutError> {
        let seq = self.next_lookup_seq();
        let email = parse_optional(email, Email::parse);
        let phone = parse_optional(phone, Phone::parse);

        if email.is_none() && phone.is_none() {
            reset_loyalty(&self.state);
            return Ok(LoyaltyStatus::Unresolved);
        }

        let current = self.lookup_seq.subscribe();
        Ok(run_lookup(
            &*self.backend,
            &self.state,
            &current,
            seq,
            email.as_ref(),
            phone.as_ref(),
        )
        .await?)
    }

    /// Make sure the discount belongs to the contact an order is placed with.
    ///
    /// Lets a pending debounced lookup land first, then looks up again only
    /// if the discount on hand was resolved for other details.
    ///
    /// # Errors
    ///
    /// Returns error if a fresh lookup was needed and the backend call failed.
    pub async fn confirm_loyalty(
        &self,
        email: &str,
        phone: &str,
    ) -> Result<LoyaltyStatus, CheckoutError> {
        self.settle().await;

        let key = (
            parse_optional(email, Email::parse),
            parse_optional(phone, Phone::parse),
        );
        {
            let state = read_state(&self.state);
            if state.loyalty_for.as_ref() == Some(&key) {
                return Ok(state.loyalty.clone());
            }
        }
        self.resolve_loyalty_now(email, phone).await
    }

    /// Wait for the most recent debounced lookup to finish.
    pub async fn settle(&self) {
        let handle = self
            .lookup_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
            && e.is_panic()
        {
            warn!(error = %e, "Loyalty lookup task panicked");
        }
    }

    /// Ask the backend which delivery method fits a postal code.
    ///
    /// A recognised suggestion is selected unless the visitor picked an
    /// option by hand while the request was in flight.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::Validation`] for a blank postal code; nothing is sent
    /// - [`CheckoutError::Busy`] while another estimate is in flight
    /// - [`CheckoutError::Backend`] if the call fails; the selection is kept
    #[instrument(skip(self))]
    pub async fn resolve_shipping_by_postal_code(
        &self,
        postal_code: &str,
    ) -> Result<ShippingSuggestion, CheckoutError> {
        let postal_code = PostalCode::parse(postal_code)?;

        let version = {
            let mut state = write_state(&self.state);
            if state.calculating {
                return Err(CheckoutError::Busy);
            }
            state.calculating = true;
            state.shipping_version
        };
        let flag = CalculatingFlag(&self.state);

        let outcome = self.backend.calculate_shipping(&postal_code).await;
        drop(flag);

        let mut state = write_state(&self.state);
        match outcome {
            Ok(quote) => {
                let applied = match quote.suggested_option() {
                    Some(id) if state.shipping_version == version => {
                        state.shipping = id;
                        Some(id)
                    }
                    Some(id) => {
                        debug!(suggested = %id, "Shipping picked by hand meanwhile; suggestion dropped");
                        None
                    }
                    None => {
                        debug!(method = %quote.method, "Backend suggested an unknown shipping method");
                        None
                    }
                };
                Ok(ShippingSuggestion { quote, applied })
            }
            Err(e) => {
                warn!(error = %e, "Shipping estimate failed");
                state.notices.push(Notice::shipping_estimate_failed());
                Err(e.into())
            }
        }
    }

    /// Validate the form and place the order.
    ///
    /// `partner` is the referral code the visitor arrived with.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Validation`] if the cart or customer details
    /// are incomplete, or [`CheckoutError::Backend`] if the backend refuses
    /// the order.
    #[instrument(skip_all, fields(has_partner = partner.is_some()))]
    pub async fn submit_order(
        &self,
        customer: CustomerDetails,
        delivery_preference: String,
        notes: String,
        partner: Option<String>,
    ) -> Result<OrderConfirmation, CheckoutError> {
        let request = {
            let state = read_state(&self.state);
            build_order(&state, customer, delivery_preference, notes, partner)?
        };
        Ok(self.backend.create_order(&request).await?)
    }

    fn next_lookup_seq(&self) -> u64 {
        self.lookup_seq.send_modify(|seq| *seq = seq.wrapping_add(1));
        *self.lookup_seq.borrow()
    }
}

/// Clears the calculating flag however the estimate ends.
struct CalculatingFlag<'a>(&'a RwLock<CheckoutState>);

impl Drop for CalculatingFlag<'_> {
    fn drop(&mut self) {
        write_state(self.0).calculating = false;
    }
}

/// Send one loyalty lookup and apply the answer if `seq` is still the newest.
async fn run_lookup<B: CheckoutApi>(
    backend: &B,
    state: &RwLock<CheckoutState>,
    current: &watch::Receiver<u64>,
    seq: u64,
    email: Option<&Email>,
    phone: Option<&Phone>,
) -> Result<LoyaltyStatus, BackendError> {
    let is_current = || *current.borrow() == seq;

    if !is_current() {
        return Ok(read_state(state).loyalty.clone());
    }
    write_state(state).loyalty_loading = true;

    let outcome = backend.check_discount(email, phone).await;

    if !is_current() {
        debug!(seq, "Discarding stale loyalty response");
        return outcome.map(|d| d.map_or(LoyaltyStatus::NotEligible, LoyaltyStatus::Resolved));
    }

    let mut state = write_state(state);
    state.loyalty_loading = false;
    match outcome {
        Ok(discount) => {
            state.loyalty = discount.map_or(LoyaltyStatus::NotEligible, LoyaltyStatus::Resolved);
            state.loyalty_for = Some((email.cloned(), phone.cloned()));
            Ok(state.loyalty.clone())
        }
        Err(e) => {
            warn!(error = %e, "Loyalty lookup failed; keeping previous discount");
            state.notices.push(Notice::loyalty_lookup_failed());
            Err(e)
        }
    }
}

fn reset_loyalty(state: &RwLock<CheckoutState>) {
    let mut state = write_state(state);
    state.loyalty = LoyaltyStatus::Unresolved;
    state.loyalty_for = Some((None, None));
    state.loyalty_loading = false;
}

fn price(state: &CheckoutState) -> PriceBreakdown {
    compute_breakdown(
        compute_subtotal(&state.cart),
        state.loyalty.discount(),
        state.shipping.option(),
        state.payment,
    )
}

/// Blank or malformed input counts as absent.
fn parse_optional<T>(raw: &str, parse: impl Fn(&str) -> Result<T, ContactError>) -> Option<T> {
    if raw.trim().is_empty() {
        return None;
    }
    parse(raw).ok()
}

fn build_order(
    state: &CheckoutState,
    customer: CustomerDetails,
    delivery_preference: String,
    notes: String,
    partner: Option<String>,
) -> Result<OrderRequest, CheckoutError> {
    if state.cart.is_empty() {
        return Err(CheckoutError::Validation("Cart is empty".to_string()));
    }

    let name = customer.name.trim();
    if name.is_empty() {
        return Err(CheckoutError::Validation("Name is required".to_string()));
    }
    let email = Email::parse(&customer.email)?;
    let phone = Phone::parse(&customer.phone)?;

    let address = customer.address.trim();
    if state.shipping.requires_address() && address.is_empty() {
        return Err(CheckoutError::Validation(
            "Address is required for delivery".to_string(),
        ));
    }

    let postal_code = customer
        .postal_code
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty());

    Ok(OrderRequest {
        customer: OrderCustomer {
            name: name.to_string(),
            email,
            phone,
            address: address.to_string(),
            postal_code,
        },
        items: state.cart.iter().map(OrderItem::from).collect(),
        payment_method: state.payment,
        shipping_option: state.shipping,
        delivery_preference,
        notes,
        partner,
        pricing: price(state),
    })
}

/// How long a visitor's checkout survives without requests.
const CHECKOUT_IDLE: Duration = Duration::from_secs(30 * 60);

/// Upper bound on checkouts held at once.
const MAX_CHECKOUTS: u64 = 10_000;

/// Live checkouts, one per visitor.
///
/// A checkout left idle for [`CHECKOUT_IDLE`] is dropped; the visitor's next
/// request starts an empty one.
pub struct CheckoutSessions<B> {
    backend: Arc<B>,
    config: CheckoutConfig,
    sessions: Cache<String, Arc<CheckoutSession<B>>>,
}

impl<B: CheckoutApi> CheckoutSessions<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, config: CheckoutConfig) -> Self {
        Self {
            backend,
            config,
            sessions: Cache::builder()
                .max_capacity(MAX_CHECKOUTS)
                .time_to_idle(CHECKOUT_IDLE)
                .build(),
        }
    }

    /// The visitor's checkout, started on first use.
    pub async fn for_visitor(&self, visitor: &str) -> Arc<CheckoutSession<B>> {
        self.sessions
            .get_with(visitor.to_string(), async {
                debug!("Starting checkout");
                Arc::new(CheckoutSession::new(
                    Arc::clone(&self.backend),
                    &self.config,
                ))
            })
            .await
    }
}

fn read_state(state: &RwLock<CheckoutState>) -> RwLockReadGuard<'_, CheckoutState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_state(state: &RwLock<CheckoutState>) -> RwLockWriteGuard<'_, CheckoutState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;
    use spoke_core::{OrderId, Yen};

    use super::*;

    /// Canned response: `None` answers with a 503.
    struct Scripted<T> {
        delay: Duration,
        outcome: Option<T>,
    }

    impl<T> Scripted<T> {
        fn ok(outcome: T) -> Self {
            Self {
                delay: Duration::ZERO,
                outcome: Some(outcome),
            }
        }

        fn failing() -> Self {
            Self {
                delay: Duration::ZERO,
                outcome: None,
            }
        }

        fn after(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        discount_calls: AtomicUsize,
        shipping_calls: AtomicUsize,
        discounts: Mutex<VecDeque<Scripted<Option<LoyaltyDiscount>>>>,
        quotes: Mutex<VecDeque<Scripted<ShippingQuote>>>,
        orders: Mutex<Vec<OrderRequest>>,
    }

    impl FakeBackend {
        fn with_discounts(script: Vec<Scripted<Option<LoyaltyDiscount>>>) -> Self {
            Self {
                discounts: Mutex::new(script.into()),
                ..Self::default()
            }
        }

        fn with_quotes(script: Vec<Scripted<ShippingQuote>>) -> Self {
            Self {
                quotes: Mutex::new(script.into()),
                ..Self::default()
            }
        }
    }

    fn unavailable() -> BackendError {
        BackendError::Api {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    impl CheckoutApi for FakeBackend {
        async fn check_discount(
            &self,
            _email: Option<&Email>,
            _phone: Option<&Phone>,
        ) -> Result<Option<LoyaltyDiscount>, BackendError> {
            self.discount_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.discounts.lock().unwrap().pop_front();
            let Some(next) = next else { return Ok(None) };
            tokio::time::sleep(next.delay).await;
            next.outcome.ok_or_else(unavailable)
        }

        async fn calculate_shipping(
            &self,
            _postal_code: &PostalCode,
        ) -> Result<ShippingQuote, BackendError> {
            self.shipping_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.quotes.lock().unwrap().pop_front();
            let Some(next) = next else { return Err(unavailable()) };
            tokio::time::sleep(next.delay).await;
            next.outcome.ok_or_else(unavailable)
        }

        async fn create_order(
            &self,
            order: &OrderRequest,
        ) -> Result<OrderConfirmation, BackendError> {
            self.orders.lock().unwrap().push(order.clone());
            Ok(OrderConfirmation {
                order_number: "SC-0001".to_string(),
                id: OrderId::new("6710a1"),
                restaurant_coupon: None,
            })
        }
    }

    fn discount(percent: i64) -> LoyaltyDiscount {
        LoyaltyDiscount {
            is_new_customer: false,
            discount: Decimal::from(percent),
            tier: None,
            tier_name: String::new(),
            message: String::new(),
        }
    }

    fn quote(method: &str) -> ShippingQuote {
        ShippingQuote {
            distance_km: Some(12.0),
            fee: Yen::new(2_500),
            method: method.to_string(),
            description: String::new(),
        }
    }

    fn session(backend: FakeBackend) -> (Arc<FakeBackend>, CheckoutSession<FakeBackend>) {
        let backend = Arc::new(backend);
        let session = CheckoutSession::new(Arc::clone(&backend), &CheckoutConfig::default());
        (backend, session)
    }

    fn customer() -> CustomerDetails {
        CustomerDetails {
            name: "Aoi Tanaka".to_string(),
            email: "aoi@example.jp".to_string(),
            phone: "090-1111-2222".to_string(),
            address: "1-2-3 Jingumae, Shibuya".to_string(),
            postal_code: Some("150-0001".to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_sends_only_after_quiet_period() {
        let (backend, session) =
            session(FakeBackend::with_discounts(vec![Scripted::ok(Some(discount(10)))]));

        session.update_contact("a@example.jp", "");
        tokio::time::sleep(Duration::from_millis(300)).await;
        session.update_contact("ao@example.jp", "");
        tokio::time::sleep(Duration::from_millis(300)).await;
        session.update_contact("aoi@example.jp", "");

        tokio::time::sleep(Duration::from_millis(799)).await;
        assert_eq!(backend.discount_calls.load(Ordering::SeqCst), 0);

        session.settle().await;
        assert_eq!(backend.discount_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.loyalty(), LoyaltyStatus::Resolved(discount(10)));
        assert!(!session.is_loyalty_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_is_discarded() {
        let (backend, session) = session(FakeBackend::with_discounts(vec![
            Scripted::ok(Some(discount(5))).after(Duration::from_secs(2)),
            Scripted::ok(Some(discount(10))).after(Duration::from_millis(10)),
        ]));

        session.update_contact("old@example.jp", "");
        tokio::time::sleep(Duration::from_millis(850)).await;
        assert!(session.is_loyalty_loading());

        session.update_contact("new@example.jp", "");
        session.settle().await;
        assert_eq!(session.loyalty(), LoyaltyStatus::Resolved(discount(10)));

        // Let the first response arrive
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(backend.discount_calls.load(Ordering::SeqCst), 2);
        assert_eq!(session.loyalty(), LoyaltyStatus::Resolved(discount(10)));
        assert!(!session.is_loyalty_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_inputs_reset_without_call() {
        let (backend, session) =
            session(FakeBackend::with_discounts(vec![Scripted::ok(Some(discount(10)))]));

        session.update_contact("aoi@example.jp", "");
        session.settle().await;
        assert_eq!(backend.discount_calls.load(Ordering::SeqCst), 1);

        session.update_contact("", "   ");
        assert_eq!(session.loyalty(), LoyaltyStatus::Unresolved);
        session.settle().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.discount_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_failure_keeps_previous_discount() {
        let (_backend, session) = session(FakeBackend::with_discounts(vec![
            Scripted::ok(Some(discount(10))),
            Scripted::failing(),
        ]));

        session.update_contact("aoi@example.jp", "");
        session.settle().await;
        session.update_contact("aoi@example.jp", "090-1111-2222");
        session.settle().await;

        assert_eq!(session.loyalty(), LoyaltyStatus::Resolved(discount(10)));
        assert!(!session.is_loyalty_loading());
        let notices = session.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::LoyaltyLookupFailed);
        assert!(session.take_notices().is_empty());
    }

    #[tokio::test]
    async fn test_not_eligible_lookup() {
        let (_backend, session) = session(FakeBackend::with_discounts(vec![Scripted::ok(None)]));
        let status = session.resolve_loyalty_now("", "090-1111-2222").await.unwrap();
        assert_eq!(status, LoyaltyStatus::NotEligible);
        assert_eq!(session.loyalty().discount(), None);
    }

    #[tokio::test]
    async fn test_breakdown_follows_inputs() {
        let (_backend, session) =
            session(FakeBackend::with_discounts(vec![Scripted::ok(Some(discount(10)))]));

        session.set_cart(vec![CartLine::new("road-frame", Yen::new(100_000), 1)]);
        session.set_payment_method(PaymentMethod::Cod);
        assert_eq!(session.breakdown().total, Yen::new(100_500));

        session.set_cart(vec![CartLine::new("road-frame", Yen::new(100_000), 2)]);
        session.set_payment_method(PaymentMethod::BankTransfer);
        session.select_shipping_option(ShippingOptionId::Zone1);
        session.resolve_loyalty_now("aoi@example.jp", "").await.unwrap();

        let breakdown = session.breakdown();
        assert_eq!(breakdown.subtotal, Yen::new(200_000));
        assert_eq!(breakdown.loyalty_discount_amount, Yen::new(20_000));
        assert_eq!(breakdown.shipping_fee, Yen::new(2_500));
        assert_eq!(breakdown.total, Yen::new(182_500));
    }

    #[tokio::test]
    async fn test_shipping_suggestion_is_applied() {
        let (_backend, session) =
            session(FakeBackend::with_quotes(vec![Scripted::ok(quote("zone_1"))]));

        let suggestion = session.resolve_shipping_by_postal_code("150-0001").await.unwrap();
        assert_eq!(suggestion.applied, Some(ShippingOptionId::Zone1));
        assert_eq!(session.shipping_option(), ShippingOptionId::Zone1);
        assert_eq!(session.breakdown().shipping_fee, Yen::new(2_500));
        assert!(!session.is_calculating_shipping());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_selection_wins_over_inflight_suggestion() {
        let (_backend, session) = session(FakeBackend::with_quotes(vec![
            Scripted::ok(quote("zone_2")).after(Duration::from_secs(1)),
        ]));

        let (suggestion, ()) = tokio::join!(
            session.resolve_shipping_by_postal_code("150-0001"),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                assert!(session.is_calculating_shipping());
                session.select_shipping_option(ShippingOptionId::Pickup);
            }
        );

        let suggestion = suggestion.unwrap();
        assert_eq!(suggestion.quote.method, "zone_2");
        assert_eq!(suggestion.applied, None);
        assert_eq!(session.shipping_option(), ShippingOptionId::Pickup);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_calculate_rejected_while_in_flight() {
        let (backend, session) = session(FakeBackend::with_quotes(vec![
            Scripted::ok(quote("zone_1")).after(Duration::from_secs(1)),
        ]));

        let (first, second) = tokio::join!(
            session.resolve_shipping_by_postal_code("150-0001"),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                session.resolve_shipping_by_postal_code("150-0002").await
            }
        );

        assert!(first.is_ok());
        assert!(matches!(second, Err(CheckoutError::Busy)));
        assert_eq!(backend.shipping_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_postal_code_is_not_sent() {
        let (backend, session) = session(FakeBackend::default());
        let err = session.resolve_shipping_by_postal_code("   ").await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
        assert_eq!(backend.shipping_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_method_leaves_selection() {
        let (_backend, session) =
            session(FakeBackend::with_quotes(vec![Scripted::ok(quote("freight"))]));
        session.select_shipping_option(ShippingOptionId::Postal);

        let suggestion = session.resolve_shipping_by_postal_code("150-0001").await.unwrap();
        assert_eq!(suggestion.applied, None);
        assert_eq!(session.shipping_option(), ShippingOptionId::Postal);
    }

    #[tokio::test]
    async fn test_shipping_failure_leaves_selection() {
        let (_backend, session) = session(FakeBackend::with_quotes(vec![Scripted::failing()]));
        session.select_shipping_option(ShippingOptionId::Zone2);

        let err = session.resolve_shipping_by_postal_code("150-0001").await.unwrap_err();
        assert!(matches!(err, CheckoutError::Backend(_)));
        assert_eq!(session.shipping_option(), ShippingOptionId::Zone2);
        assert!(!session.is_calculating_shipping());
        assert_eq!(session.take_notices()[0].kind, NoticeKind::ShippingEstimateFailed);
    }

    #[tokio::test]
    async fn test_submit_order_payload() {
        let (backend, session) = session(FakeBackend::default());
        session.set_cart(vec![CartLine::new("road-frame", Yen::new(90_000), 1)]);
        session.set_payment_method(PaymentMethod::Cod);

        let confirmation = session
            .submit_order(
                customer(),
                "weekend".to_string(),
                String::new(),
                Some("RIDE10".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(confirmation.order_number, "SC-0001");

        let orders = backend.orders.lock().unwrap();
        let order = &orders[0];
        assert_eq!(order.partner.as_deref(), Some("RIDE10"));
        assert_eq!(order.shipping_option, ShippingOptionId::FreeDelivery);
        assert_eq!(order.pricing.total, Yen::new(90_500));
        assert_eq!(order.customer.postal_code.as_deref(), Some("150-0001"));
    }

    #[tokio::test]
    async fn test_submit_order_validation() {
        let (backend, session) = session(FakeBackend::default());

        let err = session
            .submit_order(customer(), String::new(), String::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Cart is empty");

        session.set_cart(vec![CartLine::new("road-frame", Yen::new(90_000), 1)]);

        let no_address = CustomerDetails {
            address: "  ".to_string(),
            ..customer()
        };
        let err = session
            .submit_order(no_address.clone(), String::new(), String::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));

        let bad_email = CustomerDetails {
            email: "nope".to_string(),
            ..customer()
        };
        assert!(
            session
                .submit_order(bad_email, String::new(), String::new(), None)
                .await
                .is_err()
        );
        assert!(backend.orders.lock().unwrap().is_empty());

        // Pickup needs no address
        session.select_shipping_option(ShippingOptionId::Pickup);
        session
            .submit_order(no_address, String::new(), String::new(), None)
            .await
            .unwrap();
        assert_eq!(backend.orders.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_loyalty_reuses_settled_lookup() {
        let (backend, session) = session(FakeBackend::with_discounts(vec![
            Scripted::ok(Some(discount(10))),
            Scripted::ok(Some(discount(15))),
        ]));

        session.update_contact("aoi@example.jp", "");
        let status = session.confirm_loyalty("aoi@example.jp", "").await.unwrap();
        assert_eq!(status, LoyaltyStatus::Resolved(discount(10)));
        assert_eq!(backend.discount_calls.load(Ordering::SeqCst), 1);

        // Ordering with other details than the ones typed looks up again
        let status = session
            .confirm_loyalty("aoi@example.jp", "090-1111-2222")
            .await
            .unwrap();
        assert_eq!(status, LoyaltyStatus::Resolved(discount(15)));
        assert_eq!(backend.discount_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_loyalty_retries_after_failed_lookup() {
        let (backend, session) = session(FakeBackend::with_discounts(vec![
            Scripted::ok(Some(discount(10))),
            Scripted::failing(),
            Scripted::ok(Some(discount(20))),
        ]));

        session.update_contact("old@example.jp", "");
        session.settle().await;
        session.update_contact("new@example.jp", "");
        session.settle().await;
        assert_eq!(session.loyalty(), LoyaltyStatus::Resolved(discount(10)));

        let status = session.confirm_loyalty("new@example.jp", "").await.unwrap();
        assert_eq!(status, LoyaltyStatus::Resolved(discount(20)));
        assert_eq!(backend.discount_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_reports_flags_and_drains_notices() {
        let (_backend, session) = session(FakeBackend::with_quotes(vec![
            Scripted::ok(quote("zone_2")).after(Duration::from_secs(1)),
        ]));
        let session = Arc::new(session);
        session.set_cart(vec![CartLine::new("road-frame", Yen::new(90_000), 1)]);

        let estimating = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.resolve_shipping_by_postal_code("150-0001").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(session.view().calculating_shipping);
        estimating.await.unwrap().unwrap();

        let view = session.view();
        assert!(!view.calculating_shipping);
        assert_eq!(view.shipping_option, ShippingOptionId::Zone2);
        assert_eq!(view.breakdown, session.breakdown());

        // Queue is empty now, so the next estimate fails with a notice
        assert!(session.resolve_shipping_by_postal_code("150-0001").await.is_err());
        assert_eq!(session.view().notices.len(), 1);
        assert!(session.view().notices.is_empty());
    }

    #[tokio::test]
    async fn test_sessions_are_kept_per_visitor() {
        let sessions =
            CheckoutSessions::new(Arc::new(FakeBackend::default()), CheckoutConfig::default());

        let first = sessions.for_visitor("visitor-a").await;
        first.select_shipping_option(ShippingOptionId::Pickup);

        let again = sessions.for_visitor("visitor-a").await;
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.shipping_option(), ShippingOptionId::Pickup);

        let other = sessions.for_visitor("visitor-b").await;
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(other.shipping_option(), ShippingOptionId::default());
    }
}
