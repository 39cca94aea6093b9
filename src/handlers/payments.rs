//! Payment provider redirect handler
//!
//! The checkout flow sends the rider's browser back here after paying.
//! The page is a dead end on purpose: the real confirmation lands in the
//! rider's WhatsApp chat. Replays of the same callback must stay harmless.

use axum::{
    extract::{Query, State},
    response::Html,
};

use crate::billing::Settlement;
use crate::chat::SessionStep;
use crate::error::{ApiError, ApiResult};
use crate::payments::{CallbackParams, ExternalReference, PaymentStatus};
use crate::state::AppState;

pub async fn payment_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> ApiResult<Html<String>> {
    let Some(status) = PaymentStatus::from_param(&params.status) else {
        return Err(ApiError::BadRequest(format!(
            "Unknown payment status: {}",
            params.status
        )));
    };

    let reference = ExternalReference::decode(&params.external_reference)
        .map_err(|_| ApiError::BadRequest("Malformed external reference".to_string()))?;

    match status {
        PaymentStatus::Approved => {
            let settlement = state
                .billing
                .settle_approved(
                    reference.topup_record_id,
                    reference.user_id,
                    params.payment_id.as_deref(),
                )
                .await?;

            match settlement {
                Settlement::Credited { topup, new_balance } => {
                    state
                        .sessions
                        .save_step(&topup.rider_phone, &SessionStep::MenuMain)
                        .await?;
                    state
                        .messaging
                        .notify(
                            &topup.rider_phone,
                            &format!(
                                "✅ Se acreditaron ${} a tu cuenta. Saldo actual: ${}.",
                                topup.amount, new_balance
                            ),
                        )
                        .await;
                    Ok(callback_page(
                        "¡Pago acreditado!",
                        "Tu saldo ya está disponible. Volvé a WhatsApp para seguir.",
                    ))
                }
                Settlement::AlreadySettled => Ok(callback_page(
                    "Pago ya procesado",
                    "Esta recarga ya fue acreditada. Revisá tu saldo en WhatsApp.",
                )),
                Settlement::NotFound => Ok(callback_page(
                    "Recarga no encontrada",
                    "No encontramos esta recarga. Escribinos por WhatsApp si el pago se hizo igual.",
                )),
            }
        }
        PaymentStatus::Failure => {
            if let Some(topup) = state
                .billing
                .mark_failed(reference.topup_record_id, reference.user_id)
                .await?
            {
                state
                    .sessions
                    .save_step(&topup.rider_phone, &SessionStep::MenuMain)
                    .await?;
                state
                    .messaging
                    .notify(
                        &topup.rider_phone,
                        "❌ El pago no se concretó. Enviá *5* para intentar de nuevo.",
                    )
                    .await;
            }
            Ok(callback_page(
                "Pago no concretado",
                "El pago no se pudo completar. Podés intentar de nuevo desde WhatsApp.",
            ))
        }
        PaymentStatus::Pending => {
            if let Some(topup) = state.billing.get_topup(reference.topup_record_id).await? {
                state
                    .messaging
                    .notify(
                        &topup.rider_phone,
                        "⏳ Tu pago quedó pendiente de confirmación. Te aviso por acá apenas se acredite.",
                    )
                    .await;
            }
            Ok(callback_page(
                "Pago pendiente",
                "El pago está en proceso. Te avisamos por WhatsApp cuando se acredite.",
            ))
        }
    }
}

fn callback_page(title: &str, detail: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"es\">\n<head><meta charset=\"utf-8\"><title>Rodada</title></head>\n\
<body style=\"font-family: sans-serif; text-align: center; padding: 3em;\">\n\
<h1>🚲 {}</h1>\n<p>{}</p>\n</body>\n</html>",
        title, detail
    ))
}
