//! Single entry point from a decoded [`Command`] to a state transition.

use super::protocol::{Command, Outbound};
use crate::broadcast::Effects;
use crate::clock::Moment;
use crate::engine::Match;
use crate::models::ConnectionId;
use tracing::debug;

/// Apply one command from `conn` to `m` and collect the resulting messages.
///
/// Invalid-state and invalid-reference commands are no-ops; the few that
/// warrant feedback are answered to the caller alone.
pub fn apply(m: &mut Match, conn: &ConnectionId, command: Command, now: Moment) -> Effects {
    let mut fx = Effects::new();
    m.touch(now.mono);

    let is_join = matches!(command, Command::JoinReferee { .. });
    let event = command_name(&command);

    let outcome = match command {
        Command::JoinOperator => {
            m.join_operator(now, &mut fx);
            Ok(())
        }
        Command::SetNames { red, blue } => {
            m.set_names(&red, &blue, &mut fx);
            Ok(())
        }
        Command::SetCategory { category } => {
            m.set_category(&category, &mut fx);
            Ok(())
        }
        Command::Proceed => m.proceed(now, &mut fx),
        Command::Timer { action } => m.timer_control(action, now, &mut fx),
        Command::AdjustScore { color, delta } => m.adjust_score(color, delta, now, &mut fx),
        Command::ApplyPenalty { color } => m.apply_penalty(color, now, &mut fx),
        Command::Undo => m.undo(&mut fx),
        Command::NextRound => m.next_round(now, &mut fx),
        Command::DeclareWinner { color } => m.declare_winner(color, now, &mut fx),
        Command::RequestReplay { color } => m.request_replay(color, &mut fx),
        Command::AcknowledgeReplay => {
            m.acknowledge_replay(&mut fx);
            Ok(())
        }
        Command::NewMatch => {
            m.new_match(now, &mut fx);
            Ok(())
        }
        Command::JoinReferee { password, name } => {
            m.join_referee(conn, &password, &name, now, &mut fx)
        }
        Command::RenameReferee { password, name } => {
            m.rename_referee(conn, &password, &name, now, &mut fx)
        }
        Command::RefereeActivity { password } => m.referee_activity(conn, &password, now, &mut fx),
        Command::CastVote {
            password,
            color,
            points,
        } => m.cast_vote(conn, &password, color, points, now, &mut fx),
        Command::PenaltySignal { password, color } => {
            m.penalty_signal(conn, &password, color, now, &mut fx)
        }
        Command::AcceptReplay { password } => m.accept_replay(conn, &password, &mut fx),
        Command::DeclineReplay { password } => m.decline_replay(conn, &password, &mut fx),
        Command::Disconnect => {
            m.disconnect(conn, now, &mut fx);
            Ok(())
        }
    };

    if let Err(rejection) = outcome {
        debug!(code = m.code(), %conn, event, %rejection, "command rejected");
        if rejection.notify_caller() {
            if is_join {
                fx.reply(Outbound::JoinResult {
                    ok: false,
                    name: None,
                    error: Some(rejection.to_string()),
                });
            } else {
                fx.reply(Outbound::notice(rejection.to_string()));
            }
        }
    }
    fx
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::JoinOperator => "join_operator",
        Command::SetNames { .. } => "set_names",
        Command::SetCategory { .. } => "set_category",
        Command::Proceed => "proceed",
        Command::Timer { .. } => "timer",
        Command::AdjustScore { .. } => "adjust_score",
        Command::ApplyPenalty { .. } => "apply_penalty",
        Command::Undo => "undo",
        Command::NextRound => "next_round",
        Command::DeclareWinner { .. } => "declare_winner",
        Command::RequestReplay { .. } => "request_replay",
        Command::AcknowledgeReplay => "acknowledge_replay",
        Command::NewMatch => "new_match",
        Command::JoinReferee { .. } => "join_referee",
        Command::RenameReferee { .. } => "rename_referee",
        Command::RefereeActivity { .. } => "referee_activity",
        Command::CastVote { .. } => "cast_vote",
        Command::PenaltySignal { .. } => "penalty_signal",
        Command::AcceptReplay { .. } => "accept_replay",
        Command::DeclineReplay { .. } => "decline_replay",
        Command::Disconnect => "disconnect",
    }
}
