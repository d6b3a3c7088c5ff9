mod sets;

pub(crate) use sets::VecSet;
