use crate::link::{HandlerError, ResponseHandler};

pub type HandlerRef<'a> = &'a (dyn ResponseHandler<'a> + Sync);

/// Fixed table of response handlers keyed by source id
///
/// Holds at most one registration per source id. A lookup consumes the registration.
pub(crate) struct HandlerTable<'a, const N: usize> {
    slots: [Option<(u8, HandlerRef<'a>)>; N],
}

impl<'a, const N: usize> HandlerTable<'a, N> {
    pub fn new() -> Self {
        Self {
            slots: [None; N],
        }
    }

    pub fn insert(&mut self, source_id: u8, handler: HandlerRef<'a>) -> Result<(), HandlerError> {
        if self.contains(source_id) {
            return Err(HandlerError::SourceIdInUse);
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(HandlerError::NoResources)?;
        *slot = Some((source_id, handler));
        Ok(())
    }

    pub fn take(&mut self, source_id: u8) -> Option<HandlerRef<'a>> {
        self.slots
            .iter_mut()
            .find(|slot| matches!(slot, Some((id, _)) if *id == source_id))
            .and_then(|slot| slot.take())
            .map(|(_, handler)| handler)
    }

    pub fn contains(&self, source_id: u8) -> bool {
        self.slots
            .iter()
            .any(|slot| matches!(slot, Some((id, _)) if *id == source_id))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
