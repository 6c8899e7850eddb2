//! Generic object protocol shared by every model
//!
//! Pose/velocity/acceleration and geometry are universal properties of a
//! registered model, so one set of accessors serves every interface type.

use crate::dispatch::AccessorError;
use crate::model::{Geom, Pva};

pub type PvaGetFn<H> = Box<dyn Fn(&H) -> Result<Pva, AccessorError>>;
pub type PvaSetFn<H> = Box<dyn Fn(&H, &Pva) -> Result<(), AccessorError>>;
pub type GeomGetFn<H> = Box<dyn Fn(&H) -> Result<Geom, AccessorError>>;
pub type GeomSetFn<H> = Box<dyn Fn(&H, &Geom) -> Result<(), AccessorError>>;

/// Simulation clock in microseconds
pub type ClockFn = Box<dyn Fn() -> u64>;

/// The pva and geom accessors of the backend
pub struct GenericCallbacks<H> {
    pva_get: PvaGetFn<H>,
    pva_set: PvaSetFn<H>,
    geom_get: GeomGetFn<H>,
    geom_set: GeomSetFn<H>,
}

impl<H> GenericCallbacks<H> {
    pub fn new(
        pva_get: impl Fn(&H) -> Result<Pva, AccessorError> + 'static,
        pva_set: impl Fn(&H, &Pva) -> Result<(), AccessorError> + 'static,
        geom_get: impl Fn(&H) -> Result<Geom, AccessorError> + 'static,
        geom_set: impl Fn(&H, &Geom) -> Result<(), AccessorError> + 'static,
    ) -> Self {
        Self {
            pva_get: Box::new(pva_get),
            pva_set: Box::new(pva_set),
            geom_get: Box::new(geom_get),
            geom_set: Box::new(geom_set),
        }
    }

    pub fn get_pva(&self, handle: &H) -> Result<Pva, AccessorError> {
        (self.pva_get)(handle)
    }

    pub fn set_pva(&self, handle: &H, pva: &Pva) -> Result<(), AccessorError> {
        (self.pva_set)(handle, pva)
    }

    pub fn get_geom(&self, handle: &H) -> Result<Geom, AccessorError> {
        (self.geom_get)(handle)
    }

    pub fn set_geom(&self, handle: &H, geom: &Geom) -> Result<(), AccessorError> {
        (self.geom_set)(handle, geom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_callbacks_reach_backend_state() {
        let poses: Rc<RefCell<Vec<Pva>>> = Rc::new(RefCell::new(vec![Pva::default(); 2]));
        let (get_world, set_world) = (poses.clone(), poses.clone());

        let generic: GenericCallbacks<usize> = GenericCallbacks::new(
            move |&idx| {
                get_world
                    .borrow()
                    .get(idx)
                    .copied()
                    .ok_or_else(|| AccessorError::new("no such model"))
            },
            move |&idx, pva| {
                let mut world = set_world.borrow_mut();
                let slot = world
                    .get_mut(idx)
                    .ok_or_else(|| AccessorError::new("no such model"))?;
                *slot = *pva;
                Ok(())
            },
            |_| Ok(Geom::default()),
            |_, _| Err(AccessorError::new("geometry is fixed")),
        );

        let mut pva = Pva::default();
        pva.p[0] = 3.0;
        generic.set_pva(&1, &pva).unwrap();
        assert_eq!(generic.get_pva(&1).unwrap().p[0], 3.0);
        assert_eq!(generic.get_pva(&0).unwrap().p[0], 0.0);
        assert!(generic.get_pva(&5).is_err());

        assert_eq!(generic.get_geom(&0).unwrap(), Geom::default());
        assert_eq!(
            generic.set_geom(&0, &Geom::default()).unwrap_err(),
            AccessorError::new("geometry is fixed")
        );
    }
}
