// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use crate::injector::{InjectorId, InjectorOptions};

/// A mutation requested through an [`super::InjectorHandle`], applied on the
/// worker thread.
#[derive(Clone, Debug)]
pub(super) enum Command {
    Stop(InjectorId),
    Restart(InjectorId),
    SetOptions(InjectorId, InjectorOptions),
}

impl Command {
    pub(super) fn id(&self) -> InjectorId {
        match self {
            Command::Stop(id) | Command::Restart(id) | Command::SetOptions(id, _) => *id,
        }
    }
}
