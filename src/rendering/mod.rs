//! Scene graph the room renders from. Drawing itself is out of scope; only
//! transforms, parenting and ray picking are modelled.

pub mod scene;
