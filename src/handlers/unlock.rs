//! Unlock code redemption handler
//!
//! Called by the lock gateway when a rider keys a code into a bike. The
//! response `message` is suitable for the keypad display.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiResult;
use crate::iot::UnlockOutcome;
use crate::models::ApiResponse;
use crate::rides::RideStart;
use crate::state::AppState;
use crate::tokens::Redemption;

#[derive(Debug, Deserialize, Validate)]
pub struct UnlockRequest {
    #[validate(length(min = 6, max = 6, message = "unlock code must be 6 digits"))]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    pub ride_id: Uuid,
    pub bike_id: String,
    pub message: String,
}

/// Redeem a code and start the ride. Every rejection consumes the code;
/// the rider asks for a fresh one over WhatsApp.
pub async fn redeem_unlock_code(
    State(state): State<AppState>,
    Json(request): Json<UnlockRequest>,
) -> ApiResult<Json<ApiResponse<UnlockResponse>>> {
    request.validate()?;

    let token = match state.tokens.redeem(&request.token).await? {
        Redemption::Invalid => {
            return Ok(Json(ApiResponse::rejected("Código inválido")));
        }
        Redemption::Expired => {
            return Ok(Json(ApiResponse::rejected(
                "El código expiró. Pedí uno nuevo por WhatsApp",
            )));
        }
        Redemption::Redeemed(token) => token,
    };

    let Some(rider) = state.riders.find_by_phone(&token.rider_phone).await? else {
        tracing::warn!(code = %token.code, "Redeemed code has no matching rider");
        return Ok(Json(ApiResponse::rejected("Código inválido")));
    };

    match state.iot.unlock(&token.device_id).await {
        Ok(UnlockOutcome::Confirmed) => {}
        Ok(UnlockOutcome::NotConfirmed) => {
            return Ok(Json(ApiResponse::rejected(
                "La bici no confirmó el desbloqueo. Pedí un código nuevo por WhatsApp",
            )));
        }
        Err(e) => {
            tracing::warn!(device_id = %token.device_id, "Unlock instruction failed: {:#}", e);
            return Ok(Json(ApiResponse::rejected(
                "No pudimos contactar la bici. Pedí un código nuevo por WhatsApp",
            )));
        }
    }

    match state.rides.start_ride(&token, &rider).await? {
        RideStart::Started(ride) => {
            state
                .messaging
                .notify(
                    &token.rider_phone,
                    &format!(
                        "🚴 ¡Viaje iniciado en {}! Cuando termines, cerrá el candado y te mando el resumen por acá.",
                        ride.bike_id
                    ),
                )
                .await;

            Ok(Json(ApiResponse::ok(UnlockResponse {
                ride_id: ride.id,
                bike_id: ride.bike_id,
                message: "Viaje iniciado, ¡buen pedaleo!".to_string(),
            })))
        }
        RideStart::BikeUnavailable => {
            tracing::error!(
                bike_id = %token.bike_id,
                "Lock opened but the bike could not be claimed"
            );
            Ok(Json(ApiResponse::rejected(
                "La bici ya no está disponible. Elegí otra por WhatsApp",
            )))
        }
        RideStart::RiderAlreadyRiding => {
            tracing::error!(
                bike_id = %token.bike_id,
                "Lock opened but the rider already has an open ride"
            );
            Ok(Json(ApiResponse::rejected(
                "Ya tenés un viaje en curso. Cerrá el candado para terminarlo",
            )))
        }
    }
}
