//! Conversation flow tests against a live database

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rand::Rng;
    use sqlx::PgPool;
    use uuid::Uuid;

    use rodada_server::assistant::AssistantClient;
    use rodada_server::billing::BillingService;
    use rodada_server::chat::{ChatEngine, SessionStep, SessionStore};
    use rodada_server::iot::IotClient;
    use rodada_server::messaging::WhatsAppClient;
    use rodada_server::payments::CheckoutClient;
    use rodada_server::registry::RegistryService;
    use rodada_server::riders::RiderService;
    use rodada_server::rides::{RideService, RideStart, RideWatchdog};
    use rodada_server::tokens::TokenStore;

    /// Helper to create a test database pool
    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/rodada_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        rodada_server::db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        sqlx::query(
            "INSERT INTO fare_plans (id, base_fee, per_minute_rate, currency, active)
             VALUES ('standard', 500, 10, 'ARS', TRUE)
             ON CONFLICT (id) DO UPDATE SET base_fee = 500, per_minute_rate = 10, active = TRUE",
        )
        .execute(&pool)
        .await
        .expect("Failed to seed fare plan");

        pool
    }

    fn unique_phone() -> String {
        format!(
            "whatsapp:+549351{}",
            rand::thread_rng().gen_range(1_000_000u64..10_000_000)
        )
    }

    fn unique_dni() -> String {
        rand::thread_rng()
            .gen_range(10_000_000u64..100_000_000)
            .to_string()
    }

    /// All outbound adapters point at a closed port. Replies are dropped on
    /// the floor; assertions read the database instead.
    fn build_engine(pool: &PgPool) -> ChatEngine {
        ChatEngine::new(
            pool.clone(),
            SessionStore::new(pool.clone()),
            Arc::new(RegistryService::new(pool.clone())),
            Arc::new(TokenStore::new(pool.clone(), 180)),
            Arc::new(RiderService::new(pool.clone())),
            Arc::new(BillingService::new(
                pool.clone(),
                Arc::new(CheckoutClient::new(
                    "http://127.0.0.1:9".to_string(),
                    "TEST-token".to_string(),
                    "http://localhost:3001".to_string(),
                )),
            )),
            Arc::new(WhatsAppClient::new(
                "http://127.0.0.1:9".to_string(),
                "ACtest".to_string(),
                "authtoken".to_string(),
                "whatsapp:+10000000000".to_string(),
            )),
            // No API key: the assistant degrades to its canned reply.
            Arc::new(AssistantClient::new(
                "http://127.0.0.1:9".to_string(),
                None,
                "gpt-4o-mini".to_string(),
            )),
        )
    }

    async fn say(engine: &ChatEngine, phone: &str, text: &str) {
        engine
            .handle_message(phone, text)
            .await
            .expect("Engine failed to process message");
    }

    async fn current_step(pool: &PgPool, phone: &str) -> SessionStep {
        SessionStore::new(pool.clone())
            .load(phone)
            .await
            .expect("Session load failed")
            .expect("Session missing")
            .step
            .0
    }

    async fn seed_bike(pool: &PgPool) -> String {
        let name = format!("Test-{}", rand::thread_rng().gen_range(100_000u64..1_000_000));
        let imei = format!(
            "8670{}",
            rand::thread_rng().gen_range(10_000_000_000u64..100_000_000_000)
        );

        sqlx::query(
            "INSERT INTO bikes (bike_id, device_id, lat, lon, is_reserved, is_disabled)
             VALUES ($1, $2, -31.4201, -64.1888, FALSE, FALSE)",
        )
        .bind(&name)
        .bind(&imei)
        .execute(pool)
        .await
        .expect("Failed to seed bike");

        name
    }

    /// Walks the whole registration dialogue for a fresh phone.
    async fn register_via_chat(engine: &ChatEngine, pool: &PgPool, phone: &str) -> String {
        let dni = unique_dni();
        say(engine, phone, "hola").await;
        say(engine, phone, "2").await;
        say(engine, phone, "Ana").await;
        say(engine, phone, "Paz").await;
        say(engine, phone, &dni).await;
        say(engine, phone, "ana@example.com").await;
        say(engine, phone, "sí").await;

        assert!(matches!(
            current_step(pool, phone).await,
            SessionStep::MenuMain
        ));
        dni
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_first_contact_creates_session_at_menu() {
        let pool = setup_test_db().await;
        let engine = build_engine(&pool);
        let phone = unique_phone();

        say(&engine, &phone, "hola").await;

        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::MenuMain
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_registration_dialogue_creates_rider() {
        let pool = setup_test_db().await;
        let engine = build_engine(&pool);
        let phone = unique_phone();

        let dni = register_via_chat(&engine, &pool, &phone).await;

        let rider = RiderService::new(pool.clone())
            .find_by_phone(&phone)
            .await
            .expect("Rider lookup failed")
            .expect("Registration did not create the rider");
        assert_eq!(rider.first_name, "Ana");
        assert_eq!(rider.last_name, "Paz");
        assert_eq!(rider.dni, dni);
        assert_eq!(rider.balance, 0);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_registration_reprompts_on_bad_input() {
        let pool = setup_test_db().await;
        let engine = build_engine(&pool);
        let phone = unique_phone();

        say(&engine, &phone, "hola").await;
        say(&engine, &phone, "2").await;
        say(&engine, &phone, "Ana").await;
        say(&engine, &phone, "Paz").await;

        // Dotted DNI is rejected and the step does not advance.
        say(&engine, &phone, "30.111.222").await;
        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::AskDni { .. }
        ));

        say(&engine, &phone, &unique_dni()).await;
        say(&engine, &phone, "not-an-email").await;
        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::AskEmail { .. }
        ));

        say(&engine, &phone, "ana@example.com").await;
        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::ConfirmData { .. }
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_rejected_confirmation_discards_the_draft() {
        let pool = setup_test_db().await;
        let engine = build_engine(&pool);
        let phone = unique_phone();

        say(&engine, &phone, "hola").await;
        say(&engine, &phone, "2").await;
        say(&engine, &phone, "Ana").await;
        say(&engine, &phone, "Paz").await;
        say(&engine, &phone, &unique_dni()).await;
        say(&engine, &phone, "ana@example.com").await;
        say(&engine, &phone, "no").await;

        let session = SessionStore::new(pool.clone())
            .load(&phone)
            .await
            .expect("Session load failed");
        assert!(session.is_none(), "Declined confirmation must drop the session");

        let rider = RiderService::new(pool.clone())
            .find_by_phone(&phone)
            .await
            .expect("Rider lookup failed");
        assert!(rider.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_menu_command_escapes_any_step() {
        let pool = setup_test_db().await;
        let engine = build_engine(&pool);
        let phone = unique_phone();

        say(&engine, &phone, "hola").await;
        say(&engine, &phone, "2").await;
        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::AskName
        ));

        say(&engine, &phone, "menu").await;
        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::MenuMain
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_bike_request_asks_unregistered_rider_for_dni() {
        let pool = setup_test_db().await;
        let engine = build_engine(&pool);
        let phone = unique_phone();
        let bike = seed_bike(&pool).await;

        say(&engine, &phone, &format!("Hola, quiero alquilar {}", bike)).await;

        let session = SessionStore::new(pool.clone())
            .load(&phone)
            .await
            .expect("Session load failed")
            .expect("Session missing");
        assert!(matches!(session.step.0, SessionStep::RequestDni));
        assert_eq!(session.selected_bike_id.as_deref(), Some(bike.as_str()));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_reserved_bike_cannot_be_selected() {
        let pool = setup_test_db().await;
        let engine = build_engine(&pool);
        let phone = unique_phone();
        let bike = seed_bike(&pool).await;

        assert!(RegistryService::new(pool.clone())
            .set_reserved(&bike, true)
            .await
            .expect("Failed to reserve bike"));

        say(&engine, &phone, "hola").await;
        say(&engine, &phone, &format!("quiero alquilar {}", bike)).await;

        let session = SessionStore::new(pool.clone())
            .load(&phone)
            .await
            .expect("Session load failed")
            .expect("Session missing");
        assert!(matches!(session.step.0, SessionStep::MenuMain));
        assert!(session.selected_bike_id.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_dni_check_links_walk_up_account() {
        let pool = setup_test_db().await;
        let engine = build_engine(&pool);
        let phone = unique_phone();
        let bike = seed_bike(&pool).await;
        let dni = unique_dni();

        // Account created at the shop desk, no phone on file yet.
        sqlx::query(
            "INSERT INTO riders (id, phone, first_name, last_name, dni, email, balance, created_at, updated_at)
             VALUES ($1, NULL, 'Bruno', 'Sosa', $2, 'bruno@example.com', 0, $3, $3)",
        )
        .bind(Uuid::new_v4())
        .bind(&dni)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .expect("Failed to seed walk-up rider");

        say(&engine, &phone, &format!("quiero alquilar {}", bike)).await;
        say(&engine, &phone, &dni).await;

        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::MenuMain
        ));

        let rider = RiderService::new(pool.clone())
            .find_by_phone(&phone)
            .await
            .expect("Rider lookup failed")
            .expect("DNI check did not link the account");
        assert_eq!(rider.dni, dni);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_unlock_option_needs_funds_before_issuing_code() {
        let pool = setup_test_db().await;
        let engine = build_engine(&pool);
        let phone = unique_phone();
        let bike = seed_bike(&pool).await;

        register_via_chat(&engine, &pool, &phone).await;
        say(&engine, &phone, &format!("quiero alquilar {}", bike)).await;

        // Zero balance: option 1 must refuse without issuing anything.
        say(&engine, &phone, "1").await;
        let codes: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM unlock_tokens WHERE rider_phone = $1")
                .bind(&phone)
                .fetch_one(&pool)
                .await
                .expect("Token count failed");
        assert_eq!(codes, 0, "Unfunded rider must not receive a code");

        sqlx::query("UPDATE riders SET balance = 2000 WHERE phone = $1")
            .bind(&phone)
            .execute(&pool)
            .await
            .expect("Failed to fund rider");

        say(&engine, &phone, "1").await;
        let codes: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM unlock_tokens WHERE rider_phone = $1")
                .bind(&phone)
                .fetch_one(&pool)
                .await
                .expect("Token count failed");
        assert_eq!(codes, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_topup_records_failure_when_checkout_is_down() {
        let pool = setup_test_db().await;
        let engine = build_engine(&pool);
        let phone = unique_phone();

        register_via_chat(&engine, &pool, &phone).await;

        say(&engine, &phone, "5").await;
        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::AskRecargaConfirm
        ));

        say(&engine, &phone, "2").await;
        say(&engine, &phone, "1500").await;
        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::AskRecarga { amount: 1500 }
        ));

        // Checkout is unreachable: the attempt is recorded as failed and
        // the rider lands back on the menu instead of a dead wait state.
        say(&engine, &phone, "sí").await;
        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::MenuMain
        ));

        let failed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM topups WHERE rider_phone = $1 AND amount = 1500 AND status = 'failure'",
        )
        .bind(&phone)
        .fetch_one(&pool)
        .await
        .expect("Top-up count failed");
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_unknown_text_keeps_the_session_where_it_was() {
        let pool = setup_test_db().await;
        let engine = build_engine(&pool);
        let phone = unique_phone();

        register_via_chat(&engine, &pool, &phone).await;
        say(&engine, &phone, "che, ¿mañana llueve?").await;

        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::MenuMain
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_support_mode_holds_until_menu() {
        let pool = setup_test_db().await;
        let engine = build_engine(&pool);
        let phone = unique_phone();

        say(&engine, &phone, "hola").await;
        say(&engine, &phone, "3").await;
        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::SoporteMode
        ));

        // Menu numbers are plain text inside support mode.
        say(&engine, &phone, "1").await;
        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::SoporteMode
        ));

        say(&engine, &phone, "menú").await;
        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::MenuMain
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_report_issue_opens_a_ticket() {
        let pool = setup_test_db().await;
        let engine = build_engine(&pool);
        let phone = unique_phone();

        say(&engine, &phone, "hola").await;
        say(&engine, &phone, "6").await;
        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::ReportIssue
        ));

        say(&engine, &phone, "La bici Test-1 tiene la cadena cortada").await;

        let tickets: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM support_tickets WHERE rider_phone = $1 AND status = 'open'",
        )
        .bind(&phone)
        .fetch_one(&pool)
        .await
        .expect("Ticket count failed");
        assert_eq!(tickets, 1);

        assert!(matches!(
            current_step(&pool, &phone).await,
            SessionStep::MenuMain
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_watchdog_leaves_unreachable_locks_alone() {
        let pool = setup_test_db().await;
        let phone = unique_phone();
        let bike_name = seed_bike(&pool).await;

        let riders = RiderService::new(pool.clone());
        let rider = {
            let engine = build_engine(&pool);
            register_via_chat(&engine, &pool, &phone).await;
            sqlx::query("UPDATE riders SET balance = 2000 WHERE phone = $1")
                .bind(&phone)
                .execute(&pool)
                .await
                .expect("Failed to fund rider");
            riders
                .find_by_phone(&phone)
                .await
                .expect("Rider lookup failed")
                .expect("Rider missing")
        };

        let registry = RegistryService::new(pool.clone());
        let bike = registry
            .get_bike(&bike_name)
            .await
            .expect("Bike lookup failed")
            .expect("Bike missing");

        let tokens = Arc::new(TokenStore::new(pool.clone(), 180));
        let rides = Arc::new(RideService::new(
            pool.clone(),
            SessionStore::new(pool.clone()),
            Arc::new(WhatsAppClient::new(
                "http://127.0.0.1:9".to_string(),
                "ACtest".to_string(),
                "authtoken".to_string(),
                "whatsapp:+10000000000".to_string(),
            )),
        ));

        let token = tokens
            .issue(&phone, &bike)
            .await
            .expect("Failed to issue code");
        let ride = match rides.start_ride(&token, &rider).await.expect("Start failed") {
            RideStart::Started(ride) => ride,
            other => panic!("Expected ride to start, got {:?}", other),
        };

        // The vendor API is unreachable, so every status poll comes back
        // unknown and the sweep must not close anything.
        let watchdog = RideWatchdog::new(
            pool.clone(),
            rides,
            Arc::new(IotClient::new(
                "http://127.0.0.1:9".to_string(),
                "appkey".to_string(),
                "appsecret".to_string(),
                "ops".to_string(),
                "password".to_string(),
                1,
            )),
            tokens,
        );
        watchdog.tick().await.expect("Watchdog sweep failed");

        let status: String = sqlx::query_scalar("SELECT status::TEXT FROM rides WHERE id = $1")
            .bind(ride.id)
            .fetch_one(&pool)
            .await
            .expect("Ride lookup failed");
        assert_eq!(status, "started", "Unknown lock state must never close a ride");
    }
}
