use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::parse::{self, MenuChoice};
use super::session::{Session, SessionStep, SessionStore};
use crate::assistant::AssistantClient;
use crate::billing::{BillingService, TopupStatus};
use crate::messaging::WhatsAppClient;
use crate::registry::{BikeLookup, RegistryService};
use crate::riders::{LedgerKind, NewRider, RegisterOutcome, RiderService};
use crate::tokens::TokenStore;

const MENU_TEXT: &str = "🚲 *Rodada*\n\n\
1. Desbloquear mi bici\n\
2. Registrarme\n\
3. Hablar con soporte\n\
4. Consultar saldo\n\
5. Cargar saldo\n\
6. Reportar un problema\n\n\
Respondé con el número de la opción.";

const TOPUP_MENU_TEXT: &str = "💳 Cargar saldo:\n\
1. Monto fijo ($1000)\n\
2. Otro monto\n\
3. Cancelar";

const NOT_REGISTERED_TEXT: &str = "No encontré tu cuenta. Enviá *2* para registrarte.";

const FIXED_TOPUP_AMOUNT: i64 = 1000;

/// Drives one rider's conversation. Each inbound message is dispatched
/// against the stored session step; replies go out over WhatsApp and are
/// best-effort, state transitions are not.
pub struct ChatEngine {
    db_pool: PgPool,
    sessions: SessionStore,
    registry: Arc<RegistryService>,
    tokens: Arc<TokenStore>,
    riders: Arc<RiderService>,
    billing: Arc<BillingService>,
    messaging: Arc<WhatsAppClient>,
    assistant: Arc<AssistantClient>,
}

impl ChatEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: PgPool,
        sessions: SessionStore,
        registry: Arc<RegistryService>,
        tokens: Arc<TokenStore>,
        riders: Arc<RiderService>,
        billing: Arc<BillingService>,
        messaging: Arc<WhatsAppClient>,
        assistant: Arc<AssistantClient>,
    ) -> Self {
        Self {
            db_pool,
            sessions,
            registry,
            tokens,
            riders,
            billing,
            messaging,
            assistant,
        }
    }

    pub async fn handle_message(&self, sender: &str, raw_text: &str) -> Result<()> {
        let text = raw_text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let session = match self.sessions.load(sender).await? {
            Some(session) => session,
            None => {
                let session = self.sessions.create(sender).await?;
                // First contact gets the menu, unless the rider opened with
                // a rent request (the QR sticker on the bike suggests one).
                if parse::rent_request(text).is_none() {
                    self.send(sender, &format!("¡Hola! Soy el asistente de Rodada.\n\n{}", MENU_TEXT))
                        .await;
                    return Ok(());
                }
                session
            }
        };

        let step = session.step.0.clone();

        // Support mode swallows everything except the exit word.
        if step == SessionStep::SoporteMode {
            return self.on_soporte(sender, text).await;
        }

        if parse::is_menu_command(text) {
            self.sessions.save_step(sender, &SessionStep::MenuMain).await?;
            self.send(sender, MENU_TEXT).await;
            return Ok(());
        }

        if let Some(bike_name) = parse::rent_request(text) {
            return self.on_bike_request(sender, &step, &bike_name).await;
        }

        if step == SessionStep::MenuMain && parse::is_greeting(text) {
            self.send(sender, MENU_TEXT).await;
            return Ok(());
        }

        match step {
            SessionStep::MenuMain => self.on_menu(sender, &session, text).await,
            SessionStep::AskName => self.on_ask_name(sender, text).await,
            SessionStep::AskLastname { first_name } => {
                self.on_ask_lastname(sender, first_name, text).await
            }
            SessionStep::AskDni {
                first_name,
                last_name,
            } => self.on_ask_dni(sender, first_name, last_name, text).await,
            SessionStep::AskEmail {
                first_name,
                last_name,
                dni,
            } => {
                self.on_ask_email(sender, first_name, last_name, dni, text)
                    .await
            }
            SessionStep::ConfirmData {
                first_name,
                last_name,
                dni,
                email,
            } => {
                self.on_confirm_data(sender, first_name, last_name, dni, email, text)
                    .await
            }
            SessionStep::RequestDni => self.on_request_dni(sender, text).await,
            SessionStep::SoporteMode => Ok(()),
            SessionStep::AskRecargaConfirm => self.on_topup_choice(sender, text).await,
            SessionStep::AskRecargaCustom => self.on_topup_custom_amount(sender, text).await,
            SessionStep::AskRecarga { amount } => self.on_topup_confirm(sender, amount, text).await,
            SessionStep::AwaitPayment { topup_id } => {
                self.on_await_payment(sender, topup_id, text).await
            }
            SessionStep::ReportIssue => self.on_report_issue(sender, text).await,
        }
    }

    // ===== Main menu =====

    async fn on_menu(&self, sender: &str, session: &Session, text: &str) -> Result<()> {
        match parse::menu_choice(text) {
            Some(MenuChoice::Unlock) => self.on_unlock_request(sender, session).await,
            Some(MenuChoice::Register) => {
                self.sessions.save_step(sender, &SessionStep::AskName).await?;
                self.send(sender, "¡Vamos a registrarte! ¿Cuál es tu nombre?")
                    .await;
                Ok(())
            }
            Some(MenuChoice::Support) => {
                self.sessions
                    .save_step(sender, &SessionStep::SoporteMode)
                    .await?;
                self.send(
                    sender,
                    "Estás hablando con soporte. Contame tu consulta. Escribí *menu* para volver.",
                )
                .await;
                Ok(())
            }
            Some(MenuChoice::Balance) => self.on_balance_query(sender).await,
            Some(MenuChoice::Topup) => {
                if self.riders.find_by_phone(sender).await?.is_none() {
                    self.send(sender, NOT_REGISTERED_TEXT).await;
                    return Ok(());
                }
                self.sessions
                    .save_step(sender, &SessionStep::AskRecargaConfirm)
                    .await?;
                self.send(sender, TOPUP_MENU_TEXT).await;
                Ok(())
            }
            Some(MenuChoice::Report) => {
                self.sessions
                    .save_step(sender, &SessionStep::ReportIssue)
                    .await?;
                self.send(sender, "Contame qué pasó y lo registramos.").await;
                Ok(())
            }
            None => {
                let reply = self.assistant.reply_to(text).await;
                self.send(sender, &reply).await;
                Ok(())
            }
        }
    }

    /// Option 1. Every precondition failure answers with its own message
    /// and leaves the session untouched.
    async fn on_unlock_request(&self, sender: &str, session: &Session) -> Result<()> {
        let Some(rider) = self.riders.find_by_phone(sender).await? else {
            self.send(sender, NOT_REGISTERED_TEXT).await;
            return Ok(());
        };

        let Some(plan) = self.registry.current_fare_plan().await? else {
            self.send(sender, "No hay una tarifa activa en este momento. Probá más tarde.")
                .await;
            return Ok(());
        };

        if rider.balance < plan.base_fee {
            self.send(
                sender,
                &format!(
                    "Te falta saldo: desbloquear cuesta ${} y tenés ${}. Enviá *5* para cargar saldo.",
                    plan.base_fee, rider.balance
                ),
            )
            .await;
            return Ok(());
        }

        let Some(bike_id) = session.selected_bike_id.clone() else {
            self.send(
                sender,
                "Primero elegí una bici: mandame \"Quiero alquilar <nombre>\" con el nombre que figura en el cuadro.",
            )
            .await;
            return Ok(());
        };

        let bike = match self.registry.get_bike(&bike_id).await? {
            Some(bike) if bike.is_available() => bike,
            _ => {
                self.send(
                    sender,
                    &format!(
                        "La bici {} ya no está disponible. Elegí otra con \"Quiero alquilar <nombre>\".",
                        bike_id
                    ),
                )
                .await;
                return Ok(());
            }
        };

        let token = self.tokens.issue(sender, &bike).await?;
        let valid_minutes = (token.expires_at - token.created_at).num_minutes().max(1);

        self.send(
            sender,
            &format!(
                "🔓 Tu código para {} es *{}*. Vence en {} minutos. Ingresalo en el teclado de la bici.",
                bike.bike_id, token.code, valid_minutes
            ),
        )
        .await;

        Ok(())
    }

    async fn on_balance_query(&self, sender: &str) -> Result<()> {
        let Some(rider) = self.riders.find_by_phone(sender).await? else {
            self.send(sender, NOT_REGISTERED_TEXT).await;
            return Ok(());
        };

        let entries = self.riders.recent_entries(rider.id, 3).await?;

        let mut message = format!("💰 Tu saldo es ${}.", rider.balance);
        if !entries.is_empty() {
            message.push_str("\nÚltimos movimientos:");
            for entry in entries {
                let sign = match entry.kind {
                    LedgerKind::Credit => "+",
                    LedgerKind::Debit => "-",
                };
                message.push_str(&format!("\n{}{} {}", sign, entry.amount, entry.concept));
            }
        }

        self.send(sender, &message).await;
        Ok(())
    }

    // ===== Bike selection =====

    async fn on_bike_request(
        &self,
        sender: &str,
        step: &SessionStep,
        bike_name: &str,
    ) -> Result<()> {
        match self.registry.find_bike_by_name(bike_name).await? {
            BikeLookup::NotFound => {
                self.send(
                    sender,
                    &format!(
                        "No encontré ninguna bici llamada \"{}\". Fijate el nombre que figura en el cuadro.",
                        bike_name
                    ),
                )
                .await;
            }
            BikeLookup::Unavailable(bike) => {
                self.send(
                    sender,
                    &format!("La bici {} no está disponible en este momento.", bike.bike_id),
                )
                .await;
            }
            BikeLookup::Available(bike) => {
                self.sessions
                    .set_selected_bike(sender, Some(&bike.bike_id))
                    .await?;

                if self.riders.find_by_phone(sender).await?.is_some() {
                    self.send(
                        sender,
                        &format!(
                            "¡{} es tuya! Enviá *1* para recibir tu código de desbloqueo.",
                            bike.bike_id
                        ),
                    )
                    .await;
                } else if *step == SessionStep::MenuMain {
                    self.sessions
                        .save_step(sender, &SessionStep::RequestDni)
                        .await?;
                    self.send(
                        sender,
                        "Para seguir necesito validar tu identidad. Mandame tu DNI (solo números). Si no tenés cuenta, enviá *2* para registrarte.",
                    )
                    .await;
                } else {
                    // Mid-flow: keep the selection, do not derail the step.
                    self.send(
                        sender,
                        &format!("Te guardo la {}. Sigamos con lo que estábamos.", bike.bike_id),
                    )
                    .await;
                }
            }
        }

        Ok(())
    }

    async fn on_request_dni(&self, sender: &str, text: &str) -> Result<()> {
        let Some(dni) = parse::valid_dni(text) else {
            self.send(sender, "El DNI va solo con números, sin puntos.").await;
            return Ok(());
        };

        match self.riders.claim_phone(&dni, sender).await? {
            Some(rider) => {
                self.sessions.save_step(sender, &SessionStep::MenuMain).await?;
                self.send(
                    sender,
                    &format!(
                        "¡Identidad verificada, {}! Enviá *1* para pedir tu código de desbloqueo.",
                        rider.first_name
                    ),
                )
                .await;
            }
            None => {
                let message = match self.riders.find_by_dni(&dni).await? {
                    Some(_) => "Ese DNI ya está vinculado a otro número. Escribí *3* para hablar con soporte.",
                    None => "No encontré ese DNI. Enviá *2* para registrarte.",
                };
                self.send(sender, message).await;
            }
        }

        Ok(())
    }

    // ===== Registration =====

    async fn on_ask_name(&self, sender: &str, text: &str) -> Result<()> {
        self.sessions
            .save_step(
                sender,
                &SessionStep::AskLastname {
                    first_name: text.to_string(),
                },
            )
            .await?;
        self.send(sender, "¿Y tu apellido?").await;
        Ok(())
    }

    async fn on_ask_lastname(&self, sender: &str, first_name: String, text: &str) -> Result<()> {
        self.sessions
            .save_step(
                sender,
                &SessionStep::AskDni {
                    first_name,
                    last_name: text.to_string(),
                },
            )
            .await?;
        self.send(sender, "¿Tu DNI? Solo números, sin puntos.").await;
        Ok(())
    }

    async fn on_ask_dni(
        &self,
        sender: &str,
        first_name: String,
        last_name: String,
        text: &str,
    ) -> Result<()> {
        let Some(dni) = parse::valid_dni(text) else {
            self.send(sender, "El DNI va solo con números, sin puntos. Probá de nuevo.")
                .await;
            return Ok(());
        };

        self.sessions
            .save_step(
                sender,
                &SessionStep::AskEmail {
                    first_name,
                    last_name,
                    dni,
                },
            )
            .await?;
        self.send(sender, "¿Tu email?").await;
        Ok(())
    }

    async fn on_ask_email(
        &self,
        sender: &str,
        first_name: String,
        last_name: String,
        dni: String,
        text: &str,
    ) -> Result<()> {
        let Some(email) = parse::valid_email(text) else {
            self.send(sender, "Ese email no parece válido. Probá de nuevo.").await;
            return Ok(());
        };

        let summary = format!(
            "Revisá tus datos:\nNombre: {} {}\nDNI: {}\nEmail: {}\n\n¿Está todo bien? Respondé *sí* o *no*.",
            first_name, last_name, dni, email
        );

        self.sessions
            .save_step(
                sender,
                &SessionStep::ConfirmData {
                    first_name,
                    last_name,
                    dni,
                    email,
                },
            )
            .await?;
        self.send(sender, &summary).await;
        Ok(())
    }

    async fn on_confirm_data(
        &self,
        sender: &str,
        first_name: String,
        last_name: String,
        dni: String,
        email: String,
        text: &str,
    ) -> Result<()> {
        if parse::is_affirmative(text) {
            let outcome = self
                .riders
                .register(NewRider {
                    phone: sender.to_string(),
                    first_name,
                    last_name,
                    dni,
                    email,
                })
                .await?;

            match outcome {
                RegisterOutcome::Registered(rider) => {
                    self.sessions.save_step(sender, &SessionStep::MenuMain).await?;
                    self.send(
                        sender,
                        &format!(
                            "¡Listo, {}! Ya estás registrado. Mandame \"Quiero alquilar <nombre>\" cuando tengas una bici a mano.",
                            rider.first_name
                        ),
                    )
                    .await;
                }
                RegisterOutcome::DniTaken => {
                    self.sessions.save_step(sender, &SessionStep::MenuMain).await?;
                    self.send(
                        sender,
                        "Ese DNI ya está registrado con otro número. Escribí *3* para hablar con soporte.",
                    )
                    .await;
                }
            }
        } else if parse::is_negative(text) {
            self.sessions.delete(sender).await?;
            self.send(sender, "Borré los datos. Cuando quieras arrancamos de nuevo con *2*.")
                .await;
        } else {
            self.send(sender, "Respondé *sí* para confirmar o *no* para cancelar.")
                .await;
        }

        Ok(())
    }

    // ===== Top-ups =====

    async fn on_topup_choice(&self, sender: &str, text: &str) -> Result<()> {
        match text.trim() {
            "1" => self.start_topup(sender, FIXED_TOPUP_AMOUNT).await,
            "2" => {
                self.sessions
                    .save_step(sender, &SessionStep::AskRecargaCustom)
                    .await?;
                self.send(sender, "¿Cuánto querés cargar? Mandame solo el número.")
                    .await;
                Ok(())
            }
            "3" => {
                self.sessions.save_step(sender, &SessionStep::MenuMain).await?;
                self.send(sender, "Listo, cancelé la recarga.").await;
                Ok(())
            }
            _ => {
                self.send(sender, "Respondé 1, 2 o 3.").await;
                Ok(())
            }
        }
    }

    async fn on_topup_custom_amount(&self, sender: &str, text: &str) -> Result<()> {
        match parse::topup_amount(text) {
            Some(amount) => {
                self.sessions
                    .save_step(sender, &SessionStep::AskRecarga { amount })
                    .await?;
                self.send(
                    sender,
                    &format!("¿Confirmás una recarga de ${}? Respondé *sí* o *no*.", amount),
                )
                .await;
            }
            None => {
                self.send(sender, "No entendí el monto. Mandame solo números, por ejemplo 1500.")
                    .await;
            }
        }
        Ok(())
    }

    async fn on_topup_confirm(&self, sender: &str, amount: i64, text: &str) -> Result<()> {
        if parse::is_affirmative(text) {
            self.start_topup(sender, amount).await
        } else if parse::is_negative(text) {
            self.sessions.save_step(sender, &SessionStep::MenuMain).await?;
            self.send(sender, "Ok, cancelé la recarga.").await;
            Ok(())
        } else {
            self.send(sender, "Respondé *sí* para confirmar o *no* para cancelar.")
                .await;
            Ok(())
        }
    }

    async fn start_topup(&self, sender: &str, amount: i64) -> Result<()> {
        let Some(rider) = self.riders.find_by_phone(sender).await? else {
            self.sessions.save_step(sender, &SessionStep::MenuMain).await?;
            self.send(sender, NOT_REGISTERED_TEXT).await;
            return Ok(());
        };

        match self
            .billing
            .create_topup(rider.id, sender, &rider.email, amount)
            .await
        {
            Ok(topup) => {
                let url = topup.checkout_url.clone().unwrap_or_default();
                self.sessions
                    .save_step(sender, &SessionStep::AwaitPayment { topup_id: topup.id })
                    .await?;
                self.send(
                    sender,
                    &format!(
                        "Generé tu link de pago por ${}:\n{}\n\nApenas se acredite te aviso por acá. Escribí *cancelar* para anular.",
                        amount, url
                    ),
                )
                .await;
            }
            Err(e) => {
                tracing::error!("Failed to create top-up: {:#}", e);
                self.sessions.save_step(sender, &SessionStep::MenuMain).await?;
                self.send(sender, "No pude generar el link de pago. Probá de nuevo en unos minutos.")
                    .await;
            }
        }

        Ok(())
    }

    async fn on_await_payment(&self, sender: &str, topup_id: Uuid, text: &str) -> Result<()> {
        if parse::wants_cancel(text) {
            let message = if self.billing.cancel_pending(topup_id, sender).await? {
                "Anulé la recarga pendiente."
            } else {
                "Esa recarga ya estaba cerrada."
            };
            self.sessions.save_step(sender, &SessionStep::MenuMain).await?;
            self.send(sender, message).await;
            return Ok(());
        }

        if parse::wants_payment_check(text) {
            match self.billing.get_topup(topup_id).await? {
                Some(topup) if topup.status == TopupStatus::Approved => {
                    self.sessions.save_step(sender, &SessionStep::MenuMain).await?;
                    self.send(sender, "✅ El pago ya se acreditó. Consultá tu saldo con *4*.")
                        .await;
                }
                Some(topup) if topup.status == TopupStatus::Pending => {
                    self.send(
                        sender,
                        "Todavía no nos llegó la confirmación del pago. Apenas llegue te aviso por acá.",
                    )
                    .await;
                }
                _ => {
                    self.sessions.save_step(sender, &SessionStep::MenuMain).await?;
                    self.send(sender, "Esa recarga no se concretó. Enviá *5* para intentar de nuevo.")
                        .await;
                }
            }
            return Ok(());
        }

        self.send(
            sender,
            "Estamos esperando la confirmación del pago. Escribí *listo* si ya pagaste, *cancelar* para anular o *menu* para volver.",
        )
        .await;
        Ok(())
    }

    // ===== Support and reports =====

    async fn on_soporte(&self, sender: &str, text: &str) -> Result<()> {
        if parse::is_menu_command(text) {
            self.sessions.save_step(sender, &SessionStep::MenuMain).await?;
            self.send(sender, MENU_TEXT).await;
            return Ok(());
        }

        let reply = self.assistant.reply_to(text).await;
        self.send(sender, &reply).await;
        Ok(())
    }

    async fn on_report_issue(&self, sender: &str, text: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO support_tickets (id, rider_phone, body, status, created_at)
            VALUES ($1, $2, $3, 'open', $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(sender)
        .bind(text)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await
        .context("Failed to record support ticket")?;

        self.sessions.save_step(sender, &SessionStep::MenuMain).await?;
        self.send(sender, "Gracias, registré tu reporte. El equipo lo revisa y te contacta por acá.")
            .await;
        Ok(())
    }

    async fn send(&self, to: &str, body: &str) {
        self.messaging.notify(to, body).await;
    }
}
