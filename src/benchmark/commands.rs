//! Text of the commands sent through the command channel.

use itertools::Itertools;
use serde_json::Value;

/// Quote `value` as a string literal of the server's command language
fn literal(value: &str) -> String {
    Value::from(value).to_string()
}

pub fn reset_all_data() -> String {
    "system.resetAllData()".into()
}

pub fn pause_simulation() -> String {
    "system.pauseSimulation()".into()
}

pub fn resume_simulation() -> String {
    "system.resumeSimulation()".into()
}

pub fn set_tick_duration(milliseconds: u64) -> String {
    format!("system.setTickDuration({milliseconds})")
}

/// Create the `bot` test entity in `room`, owned by a new user `username`
pub fn spawn_bot(bot: &str, room: &str, username: &str) -> String {
    format!(
        "bots.spawn({}, {}, {{username: {}, cpu: 100, gcl: 1}})",
        literal(bot),
        literal(room),
        literal(username)
    )
}

pub fn set_password(username: &str, password: &str) -> String {
    format!("setPassword({}, {})", literal(username), literal(password))
}

/// Remove the starting spawn of every user in `usernames`, and give their controllers
/// `safe_mode_ticks` of safe mode from the current tick with automatic respawn of the base.
pub fn prepare_bases(usernames: &[String], safe_mode_ticks: u64) -> String {
    let usernames = usernames.iter().map(|username| literal(username)).join(", ");
    format!(
        "storage.env.get(storage.env.keys.GAMETIME)\
.then(gameTime => storage.db.users.find({{username: {{$in: [{usernames}]}}}})\
.then(users => Promise.all(users.map(user => storage.db['rooms.objects']\
.removeWhere({{type: 'spawn', user: user._id}})\
.then(() => storage.db['rooms.objects'].update(\
{{type: 'controller', user: user._id}}, \
{{$set: {{safeMode: gameTime + {safe_mode_ticks}, safeModeAvailable: 0, autoSpawn: true}}}}))))))\
.then(results => 'prepared ' + results.length + ' users')"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(set_tick_duration(10), "system.setTickDuration(10)");
        assert_eq!(
            spawn_bot("screeps-bot", "W8N3", "bench_W8N3"),
            r#"bots.spawn("screeps-bot", "W8N3", {username: "bench_W8N3", cpu: 100, gcl: 1})"#
        );
        assert_eq!(
            set_password("bench_W8N3", "pa\"ss"),
            r#"setPassword("bench_W8N3", "pa\"ss")"#
        );
    }

    #[test]
    fn test_prepare_bases() {
        let command = prepare_bases(&["bench_W8N3".into(), "bench_W2N5".into()], 20000);
        assert!(command.starts_with("storage.env.get(storage.env.keys.GAMETIME)"));
        assert!(command.contains(r#"{username: {$in: ["bench_W8N3", "bench_W2N5"]}}"#));
        assert!(command.contains("removeWhere({type: 'spawn', user: user._id})"));
        assert!(command.contains("safeMode: gameTime + 20000"));
        assert_eq!(command.matches('(').count(), command.matches(')').count());
        assert_eq!(command.matches('{').count(), command.matches('}').count());
    }
}
