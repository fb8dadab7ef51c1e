use clublink::prelude::*;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Event handler
// ---------------------------------------------------------------------------

/// What the handler hands back to `main`.
enum Control {
    Replaced(Session),
    GaveUp(u32),
}

/// Logs every event and forwards session swaps to `main`.
struct LogHandler {
    control: mpsc::UnboundedSender<Control>,
}

impl EventHandler for LogHandler {
    fn on_session_replaced(&self, session: Session) {
        let _ = self.control.send(Control::Replaced(session));
    }

    fn on_login_done(&self, success: bool) {
        if success {
            info!("logged in");
        } else {
            warn!("login refused");
        }
    }

    fn on_member_list_updated(&self, house_id: HouseId, members: &[GroupMember]) {
        let forbidden = members.iter().filter(|m| m.right.is_forbidden()).count();
        info!(%house_id, members = members.len(), forbidden, "member list");
    }

    fn on_member_inserted(&self, member: &GroupMember) {
        info!(user_id = %member.user_id, nickname = %member.nickname, "member joined");
    }

    fn on_member_deleted(&self, user_id: UserId) {
        info!(%user_id, "member left");
    }

    fn on_member_right_updated(&self, member: UserId, forbid: bool, success: bool) {
        info!(%member, forbid, success, "member right");
    }

    fn on_room_list_updated(&self, tables: &[TableInfo]) {
        info!(tables = tables.len(), "table list");
        for table in tables {
            info!("  {}", describe_table(table));
        }
    }

    fn on_user_sat_down(&self, event: &SeatEvent) {
        info!(
            user_id = %event.user_id,
            table = event.mapped_number,
            chair = event.chair,
            "sat down"
        );
    }

    fn on_user_stood_up(&self, event: &SeatEvent) {
        info!(
            user_id = %event.user_id,
            table = event.mapped_number,
            chair = event.chair,
            "stood up"
        );
    }

    fn on_table_renewed(&self, renew: &TableRenew) {
        info!(
            table_id = renew.table_id,
            from = renew.old_mapped_number,
            to = renew.new_mapped_number,
            "table renewed"
        );
    }

    fn on_table_dismissed(&self, table_id: u32, mapped_number: u32) {
        info!(table_id, mapped_number, "table dismissed");
    }

    fn on_table_info(&self, table: &TableInfo) {
        info!("table info: {}", describe_table(table));
    }

    fn on_applications_received(&self, applications: &[JoinApplication]) {
        for app in applications {
            info!(
                apply_id = app.apply_id,
                user_id = %app.user_id,
                nickname = %app.nickname,
                "join application"
            );
        }
    }

    fn on_house_list_updated(&self, houses: &[HouseId]) {
        info!(?houses, "house list");
    }

    fn on_reconnect_failed(&self, attempts: u32) {
        let _ = self.control.send(Control::GaveUp(attempts));
    }
}

fn describe_table(table: &TableInfo) -> String {
    format!(
        "#{} (id {}) {}/{} players, round {}/{}",
        table.mapped_number,
        table.table_id,
        table.player_count,
        table.chair_count,
        table.played_rounds,
        table.total_rounds
    )
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    clublink::logging::init("info");

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "lobby-bot.json".into());
    let config = clublink::config::load_file(&path)?;
    info!(%path, auth = %config.auth_addr, house_id = %config.house_id, "starting lobby bot");

    let (control, mut events) = mpsc::unbounded_channel();
    let mut session = Session::connect_tcp(config, PlainCipher, LogHandler { control }).await?;
    session.request_house_list()?;

    loop {
        tokio::select! {
            Some(event) = events.recv() => match event {
                Control::Replaced(next) => {
                    info!(generation = next.generation(), "session replaced");
                    session = next;
                }
                Control::GaveUp(attempts) => {
                    error!(attempts, "reconnecting failed, exiting");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
