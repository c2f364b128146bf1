use crate::{
    config::PaymentConfig,
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus},
        payment::{self, Entity as PaymentEntity, Model as PaymentModel, PaymentMethod, PaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::gateways::{self, CallbackPayload, Gateway, SettlementMode},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub payment_code: String,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    /// Present for QR-based methods until the transfer is confirmed
    pub qr_reference: Option<String>,
}

/// Payment orchestrator: creates payment records against persisted
/// orders and drives them through the settlement state machine.
///
/// Orders always exist (committed) before any payment may reference
/// them; payment settlement runs independently of order persistence.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    config: PaymentConfig,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: PaymentConfig,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Creates a payment for an order. The initial state depends on the
    /// method's settlement mode:
    ///
    /// * COD — `created`, accepted immediately; the order proceeds to
    ///   fulfillment with no further payment action.
    /// * bank transfer / momo — `awaiting_confirmation` with a locally
    ///   generated QR reference; no external call.
    /// * zalopay / paypal — `processing`; settlement happens in
    ///   [`Self::process_payment`].
    #[instrument(skip(self))]
    pub async fn create_payment(
        &self,
        order_id: Uuid,
        method: PaymentMethod,
    ) -> Result<PaymentResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;

        if order.status.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is {} and cannot be paid",
                order_id, order.status
            )));
        }

        let already_paid = PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .filter(payment::Column::Status.eq(PaymentStatus::Success))
            .one(&*self.db)
            .await?;
        if already_paid.is_some() {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} already has a successful payment",
                order_id
            )));
        }

        let mode = method.settlement_mode();
        let (status, qr_reference) = match mode {
            SettlementMode::Immediate => (PaymentStatus::Created, None),
            SettlementMode::QrTransfer => (
                PaymentStatus::AwaitingConfirmation,
                Some(gateways::generate_qr_reference(method)),
            ),
            SettlementMode::Gateway => (PaymentStatus::Processing, None),
        };

        let now = Utc::now();
        let model = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            payment_code: Set(gateways::generate_payment_code()),
            method: Set(method),
            amount: Set(order.total_amount),
            status: Set(status),
            transaction_id: Set(None),
            qr_reference: Set(qr_reference),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await?;

        // COD needs no settlement: the order is considered payable on
        // delivery and moves straight to fulfillment.
        if mode == SettlementMode::Immediate {
            self.mark_order_paid(order_id).await?;
        }

        info!(payment_code = %model.payment_code, %order_id, ?status, "payment created");

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentCreated {
                payment_id: model.id,
                order_id,
                method: method.to_string(),
            })
            .await
        {
            warn!(error = %e, "failed to send payment created event");
        }

        Ok(Self::to_response(model))
    }

    /// Runs the simulated gateway round-trip for a `processing`
    /// payment. The configured delay is awaited (non-blocking) and the
    /// weighted outcome applied: success records the gateway
    /// transaction id and marks the order paid; failure leaves the
    /// order `pending` and surfaces [`ServiceError::PaymentFailed`] so
    /// the caller may create a fresh payment and retry.
    #[instrument(skip(self))]
    pub async fn process_payment(
        &self,
        payment_code: &str,
    ) -> Result<PaymentResponse, ServiceError> {
        let payment = self.find_by_code(payment_code).await?;

        if payment.status != PaymentStatus::Processing {
            return Err(ServiceError::InvalidStatus(format!(
                "payment {} is {} and cannot be processed",
                payment_code, payment.status
            )));
        }

        let gateway = gateways::gateway_for(payment.method, &self.config).ok_or_else(|| {
            ServiceError::InvalidOperation(format!(
                "method {} does not settle through a gateway",
                payment.method
            ))
        })?;

        let outcome = gateway.settle(&payment.payment_code, payment.amount).await;

        if outcome.success {
            let updated = self
                .transition(payment, PaymentStatus::Success, Some(outcome.transaction_id))
                .await?;
            self.mark_order_paid(updated.order_id).await?;

            if let Err(e) = self
                .event_sender
                .send(Event::PaymentSucceeded {
                    payment_id: updated.id,
                    order_id: updated.order_id,
                    transaction_id: updated.transaction_id.clone(),
                })
                .await
            {
                warn!(error = %e, "failed to send payment succeeded event");
            }

            Ok(Self::to_response(updated))
        } else {
            let updated = self
                .transition(payment, PaymentStatus::Failed, Some(outcome.transaction_id))
                .await?;

            if let Err(e) = self
                .event_sender
                .send(Event::PaymentFailed {
                    payment_id: updated.id,
                    order_id: updated.order_id,
                })
                .await
            {
                warn!(error = %e, "failed to send payment failed event");
            }

            Err(ServiceError::PaymentFailed(outcome.message))
        }
    }

    /// Manual confirmation of a QR/bank-transfer payment by an operator
    /// who has sighted the transfer.
    #[instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        payment_code: &str,
    ) -> Result<PaymentResponse, ServiceError> {
        let payment = self.find_by_code(payment_code).await?;

        if payment.status != PaymentStatus::AwaitingConfirmation {
            return Err(ServiceError::InvalidStatus(format!(
                "payment {} is {} and cannot be confirmed",
                payment_code, payment.status
            )));
        }

        let updated = self.transition(payment, PaymentStatus::Success, None).await?;
        self.mark_order_paid(updated.order_id).await?;

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentSucceeded {
                payment_id: updated.id,
                order_id: updated.order_id,
                transaction_id: None,
            })
            .await
        {
            warn!(error = %e, "failed to send payment succeeded event");
        }

        Ok(Self::to_response(updated))
    }

    /// Handles an inbound gateway callback. The HMAC signature is
    /// verified in constant time before any state is touched; an
    /// invalid signature is logged and rejected with no state change.
    ///
    /// A valid callback moves `created`, `processing` or
    /// `awaiting_confirmation` payments to `success`. A repeat callback
    /// for an already-`success` payment is an idempotent no-op.
    #[instrument(skip(self, payload), fields(payment_code = %payload.payment_code))]
    pub async fn handle_callback(
        &self,
        payload: CallbackPayload,
    ) -> Result<PaymentResponse, ServiceError> {
        if !gateways::verify_callback(&self.config.callback_secret, &payload) {
            warn!(payment_code = %payload.payment_code, "callback signature verification failed");
            return Err(ServiceError::InvalidCallback(
                "signature verification failed".to_string(),
            ));
        }

        let payment = self.find_by_code(&payload.payment_code).await?;

        match payment.status {
            // Idempotent: the gateway may deliver the same callback twice.
            PaymentStatus::Success => {
                info!(payment_code = %payload.payment_code, "duplicate callback ignored");
                Ok(Self::to_response(payment))
            }
            PaymentStatus::Created
            | PaymentStatus::Processing
            | PaymentStatus::AwaitingConfirmation => {
                let updated = self
                    .transition(
                        payment,
                        PaymentStatus::Success,
                        Some(payload.transaction_id.clone()),
                    )
                    .await?;
                self.mark_order_paid(updated.order_id).await?;

                if let Err(e) = self
                    .event_sender
                    .send(Event::PaymentSucceeded {
                        payment_id: updated.id,
                        order_id: updated.order_id,
                        transaction_id: updated.transaction_id.clone(),
                    })
                    .await
                {
                    warn!(error = %e, "failed to send payment succeeded event");
                }

                Ok(Self::to_response(updated))
            }
            PaymentStatus::Failed | PaymentStatus::Refunded => {
                Err(ServiceError::InvalidStatus(format!(
                    "payment {} is {} and cannot accept a callback",
                    payload.payment_code, payment.status
                )))
            }
        }
    }

    /// Admin-initiated refund of a successful payment.
    #[instrument(skip(self))]
    pub async fn refund_payment(
        &self,
        payment_code: &str,
    ) -> Result<PaymentResponse, ServiceError> {
        let payment = self.find_by_code(payment_code).await?;

        if payment.status != PaymentStatus::Success {
            return Err(ServiceError::InvalidStatus(format!(
                "only successful payments can be refunded, payment {} is {}",
                payment_code, payment.status
            )));
        }

        let updated = self.transition(payment, PaymentStatus::Refunded, None).await?;

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentRefunded(updated.id))
            .await
        {
            warn!(error = %e, "failed to send payment refunded event");
        }

        Ok(Self::to_response(updated))
    }

    /// Looks up a payment by its merchant reference.
    pub async fn get_payment(
        &self,
        payment_code: &str,
    ) -> Result<PaymentResponse, ServiceError> {
        let payment = self.find_by_code(payment_code).await?;
        Ok(Self::to_response(payment))
    }

    async fn find_by_code(&self, payment_code: &str) -> Result<PaymentModel, ServiceError> {
        PaymentEntity::find()
            .filter(payment::Column::PaymentCode.eq(payment_code))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("payment {} not found", payment_code))
            })
    }

    /// Applies a state-machine transition, rejecting anything outside
    /// the legal table.
    async fn transition(
        &self,
        payment: PaymentModel,
        to: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<PaymentModel, ServiceError> {
        if !payment.status.can_transition(to) {
            return Err(ServiceError::InvalidStatus(format!(
                "payment cannot move from {} to {}",
                payment.status, to
            )));
        }

        let mut active: payment::ActiveModel = payment.into();
        active.status = Set(to);
        if let Some(txid) = transaction_id {
            active.transaction_id = Set(Some(txid));
        }
        active.updated_at = Set(Some(Utc::now()));
        Ok(active.update(&*self.db).await?)
    }

    /// Moves a pending order to `processing` once its payment settles.
    /// Orders already past pending keep their status, so confirmation
    /// is idempotent at the order level.
    async fn mark_order_paid(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;

        if order.status == OrderStatus::Pending {
            let version = order.version;
            let mut active: order::ActiveModel = order.into();
            active.status = Set(OrderStatus::Processing);
            active.updated_at = Set(Some(Utc::now()));
            active.version = Set(version + 1);
            active.update(&*self.db).await?;
        }
        Ok(())
    }

    fn to_response(model: PaymentModel) -> PaymentResponse {
        PaymentResponse {
            id: model.id,
            order_id: model.order_id,
            payment_code: model.payment_code,
            method: model.method,
            amount: model.amount,
            status: model.status,
            transaction_id: model.transaction_id,
            qr_reference: model.qr_reference,
        }
    }
}
